//! Authorization collaborator: who is calling, and may they run this operation.

use crate::config::Access;
use crate::error::AppError;
use async_trait::async_trait;
use axum::http::HeaderMap;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_any_role(&self, roles: &[String]) -> bool {
        self.roles
            .iter()
            .any(|r| roles.iter().any(|want| want.eq_ignore_ascii_case(r)))
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Establish the caller's identity or fail with `Unauthorized`.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AppError>;

    /// Fail with `Forbidden` unless the identity holds one of `roles`.
    fn authorize(&self, identity: &Identity, roles: &[String]) -> Result<(), AppError> {
        if identity.has_any_role(roles) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("requires one of roles: {}", roles.join(", "))))
        }
    }

    /// Best-effort identity; never rejects. Only consulted for public operations when
    /// the application opts in with `AppState::with_public_identity`.
    async fn identify(&self, headers: &HeaderMap) -> Option<Identity> {
        self.authenticate(headers).await.ok()
    }
}

/// Trusts identity headers set by an upstream gateway.
#[derive(Clone, Debug, Default)]
pub struct HeaderAuthorizer;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Authorizer for HeaderAuthorizer {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AppError> {
        let user_id = header(headers, USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?;
        let roles = header(headers, USER_ROLES_HEADER)
            .map(|s| {
                s.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Identity {
            user_id: user_id.to_string(),
            roles,
        })
    }
}

/// Enforce an access decision. Public operations never reach the authorizer.
pub async fn check_access(
    authorizer: &dyn Authorizer,
    access: Access<'_>,
    headers: &HeaderMap,
) -> Result<Option<Identity>, AppError> {
    match access {
        Access::Public => Ok(None),
        Access::Denied => Err(AppError::Forbidden("operation is not open to any role".into())),
        Access::Roles(roles) => {
            let identity = authorizer.authenticate(headers).await?;
            authorizer.authorize(&identity, roles)?;
            Ok(Some(identity))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(v));
        }
        h
    }

    #[tokio::test]
    async fn roles_are_required_when_declared() {
        let auth = HeaderAuthorizer;
        let admin = vec!["admin".to_string()];

        let err = check_access(&auth, Access::Roles(&admin), &headers(&[])).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = check_access(&auth, Access::Roles(&admin), &headers(&[("x-user-id", "u1"), ("x-user-roles", "viewer")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let id = check_access(&auth, Access::Roles(&admin), &headers(&[("x-user-id", "u1"), ("x-user-roles", "viewer, Admin")]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id.user_id, "u1");
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Authorizer for Counting {
        async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AppError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            HeaderAuthorizer.authenticate(headers).await
        }
    }

    #[tokio::test]
    async fn public_never_rejects_and_denied_always_does() {
        let auth = HeaderAuthorizer;
        assert_eq!(check_access(&auth, Access::Public, &headers(&[])).await.unwrap(), None);
        assert!(matches!(
            check_access(&auth, Access::Denied, &headers(&[("x-user-id", "u7")])).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn public_access_skips_authentication() {
        let auth = Counting(AtomicUsize::new(0));
        let who = check_access(&auth, Access::Public, &headers(&[("x-user-id", "u7")])).await.unwrap();
        assert_eq!(who, None);
        assert_eq!(auth.0.load(Ordering::SeqCst), 0);

        let roles = vec!["editor".to_string()];
        check_access(&auth, Access::Roles(&roles), &headers(&[("x-user-id", "u7"), ("x-user-roles", "editor")]))
            .await
            .unwrap();
        assert_eq!(auth.0.load(Ordering::SeqCst), 1);
    }
}
