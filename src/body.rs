//! Request body collection.
use {bytes::Bytes, std::future::Future, tower::BoxError};

/// Body types that can be read fully into memory for parameter extraction.
///
/// Form and JSON bodies contribute to the signed parameters, so the whole body must be available before a
/// request can be validated.
pub trait IntoRequestBytes {
    /// Read this body into a [`Bytes`] object.
    fn into_request_bytes(self) -> impl Future<Output = Result<Bytes, BoxError>> + Send + Sync;
}

/// An absent body is empty.
impl IntoRequestBytes for () {
    async fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::new())
    }
}

impl IntoRequestBytes for Vec<u8> {
    async fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(self))
    }
}

impl IntoRequestBytes for String {
    async fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(self))
    }
}

impl IntoRequestBytes for &'static str {
    async fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(Bytes::from_static(self.as_bytes()))
    }
}

impl IntoRequestBytes for Bytes {
    async fn into_request_bytes(self) -> Result<Bytes, BoxError> {
        Ok(self)
    }
}
