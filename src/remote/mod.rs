//! Remote customer source.
//!
//! The remote API is a GraphQL endpoint returning the full customer list in a
//! single response. Records are untyped at this boundary; validation happens
//! in the reconciler.

mod client;
mod error;

use std::future::Future;

pub use client::{GraphQlClient, LIST_CUSTOMERS_QUERY};
pub use error::RemoteError;

use crate::models::RawCustomer;

/// Anything that can fetch the full remote customer list.
///
/// A fetch either returns every record of the response or fails; there is no
/// partial success.
pub trait RemoteSource: Send + Sync {
    fn fetch_all_customers(
        &self,
    ) -> impl Future<Output = Result<Vec<RawCustomer>, RemoteError>> + Send;
}

/// An absent remote fails every fetch with [`RemoteError::NotConfigured`].
impl<R: RemoteSource> RemoteSource for Option<R> {
    async fn fetch_all_customers(&self) -> Result<Vec<RawCustomer>, RemoteError> {
        match self {
            Some(remote) => remote.fetch_all_customers().await,
            None => Err(RemoteError::NotConfigured),
        }
    }
}
