pub mod owapi_client;

pub use owapi_client::OwApiClient;
