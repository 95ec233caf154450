pub mod headless;

#[cfg(feature = "backend_cairo")]
pub mod cairo;
