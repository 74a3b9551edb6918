//! Mutation observers.

use std::future::Future;
use std::ops::ControlFlow;

use tokio_util::sync::CancellationToken;

use super::{MutationRecord, Page};

/// Delivers batches of [`MutationRecord`]s of one page to a callback.
///
/// Records that arrive while the callback runs are delivered together in the
/// next batch. The observer stops when disconnected, dropped, or when the
/// callback returns [`ControlFlow::Break`].
#[derive(Debug)]
pub struct MutationObserver {
    token: CancellationToken,
}

impl MutationObserver {
    pub fn observe<F, Fut>(page: &Page, mut callback: F) -> Self
    where
        F: FnMut(Vec<MutationRecord>) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let mut feed = page.observe();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            loop {
                let first = tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    record = feed.recv() => record,
                };
                // The page owns the sender, so a closed feed means the page is gone
                let Some(first) = first else { break };
                let mut batch = vec![first];
                while let Ok(record) = feed.try_recv() {
                    batch.push(record);
                }

                if callback(batch).await.is_break() {
                    cancelled.cancel();
                    break;
                }
                if cancelled.is_cancelled() {
                    break;
                }
            }
            log::debug!("Mutation observer stopped");
        });

        Self { token }
    }

    /// Stops delivering records. Idempotent.
    pub fn disconnect(&self) {
        self.token.cancel();
    }

    pub fn is_connected(&self) -> bool {
        !self.token.is_cancelled()
    }
}

impl Drop for MutationObserver {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_observer_receives_insertions_until_disconnected() {
        let page = Page::from_html("https://example.com/", "<html><body></body></html>").unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let observer = MutationObserver::observe(&page, move |records| {
            let counter = Arc::clone(&counter);
            async move {
                for record in records {
                    if let MutationRecord::ImagesAdded(images) = record {
                        counter.fetch_add(images.len(), Ordering::SeqCst);
                    }
                }
                ControlFlow::Continue(())
            }
        });

        page.insert_html(r#"<img src="/1.png"><img src="/2.png">"#);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        observer.disconnect();
        assert!(!observer.is_connected());
        page.insert_html(r#"<img src="/3.png">"#);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_break_stops_observer() {
        let page = Page::loading("https://example.com/").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let observer = MutationObserver::observe(&page, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(ControlFlow::Break(()))
        });
        page.attach_head();
        tokio::time::sleep(Duration::from_millis(50)).await;
        page.attach_body();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!observer.is_connected());
    }

    #[tokio::test]
    async fn test_slow_observer_loses_no_records() {
        let page = Page::from_html("https://example.com/", "<html><body></body></html>").unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _observer = MutationObserver::observe(&page, move |records| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                for record in records {
                    if let MutationRecord::ImagesAdded(images) = record {
                        counter.fetch_add(images.len(), Ordering::SeqCst);
                    }
                }
                ControlFlow::Continue(())
            }
        });

        for i in 0..2000 {
            page.insert_html(&format!(r#"<img src="/{i}.png">"#));
        }
        for _ in 0..100 {
            if seen.load(Ordering::SeqCst) == 2000 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 2000);
    }
}
