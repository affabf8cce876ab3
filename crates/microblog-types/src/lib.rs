/// Shared types for the microblog: validated form inputs, token claims,
/// pagination and the view models handed to templates.
///
/// Kept free of database and HTTP dependencies so both microblog-db and
/// microblog-api can depend on it.
pub mod api;
pub mod models;
pub mod pagination;
