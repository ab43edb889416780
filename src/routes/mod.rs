//! Route synthesis, dispatch, and the axum adapter.

mod api;
pub mod common;
mod dispatcher;
mod table;

pub use api::api_router;
pub use common::common_routes;
pub use dispatcher::{Dispatcher, RouteMatch};
pub use table::{CrudOp, RouteEntry, RouteHandler, RouteTable};

/// Irregular plurals; everything else gets an `s`.
const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("address", "addresses"),
    ("analysis", "analyses"),
    ("box", "boxes"),
    ("category", "categories"),
    ("child", "children"),
    ("class", "classes"),
    ("company", "companies"),
    ("country", "countries"),
    ("entry", "entries"),
    ("inventory", "inventories"),
    ("person", "people"),
    ("status", "statuses"),
];

/// Path segment for a model name: `product` -> `products`, `category` -> `categories`.
/// Only the last `_`-separated word is pluralized (`stock_entry` -> `stock_entries`).
pub fn pluralize(name: &str) -> String {
    let (head, last) = match name.rfind('_') {
        Some(i) => name.split_at(i + 1),
        None => ("", name),
    };
    let plural = IRREGULAR_PLURALS
        .iter()
        .find(|(one, _)| *one == last)
        .map(|(_, many)| many.to_string())
        .unwrap_or_else(|| format!("{}s", last));
    format!("{}{}", head, plural)
}
