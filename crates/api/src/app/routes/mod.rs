use axum::Router;

pub mod admin;
pub mod exports;
pub mod orders;
pub mod products;
pub mod system;

/// Authenticated endpoints, grouped by rate-limit class by the caller.
pub struct ClassRouters {
    pub products: Router,
    pub orders: Router,
    pub exports: Router,
    pub admin: Router,
}

pub fn routers() -> ClassRouters {
    ClassRouters {
        products: Router::new().nest("/products", products::router()),
        orders: Router::new().nest("/orders", orders::router()),
        exports: Router::new().nest("/exports", exports::router()),
        admin: Router::new().nest("/admin", admin::router()),
    }
}
