//! Page sources

use std::future::Future;

use async_trait::async_trait;
use eyre::Result;

/// Supplier of pages for a progressive loader.
///
/// Must be idempotent for a given `(page_index, page_size)`: a failed page is
/// requested again with the same arguments.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn load_page(&self, page_index: usize, page_size: usize) -> Result<Vec<T>>;
}

/// Page source backed by an async closure
pub struct FnPageSource<F> {
    load: F,
}

impl<F> FnPageSource<F> {
    pub fn new(load: F) -> Self {
        Self { load }
    }
}

#[async_trait]
impl<T, F, Fut> PageSource<T> for FnPageSource<F>
where
    T: Send + 'static,
    F: Fn(usize, usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<T>>> + Send,
{
    async fn load_page(&self, page_index: usize, page_size: usize) -> Result<Vec<T>> {
        (self.load)(page_index, page_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_page_source_passes_arguments() {
        let source = FnPageSource::new(|page: usize, size: usize| async move { Ok(vec![(page, size)]) });
        let page = source.load_page(3, 7).await.unwrap();
        assert_eq!(page, vec![(3, 7)]);
    }

    #[tokio::test]
    async fn test_fn_page_source_propagates_errors() {
        let source = FnPageSource::new(|_page: usize, _size: usize| async { Err::<Vec<u8>, _>(eyre::eyre!("503")) });
        let err = source.load_page(0, 20).await.unwrap_err();
        assert_eq!(err.to_string(), "503");
    }
}
