pub mod proxy;

pub use proxy::ProxyRepository;
