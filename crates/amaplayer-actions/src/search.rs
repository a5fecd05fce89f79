use std::sync::Arc;

use amaplayer_core::config::SearchConfig;
use amaplayer_core::search::{build_query, SearchFilters, SearchQuery};
use amaplayer_core::{ClassifiedError, ErrorKind};

use crate::backend::{SearchBackend, SearchHit};
use crate::retry::RetryScheduler;
use crate::{ActionError, Result};

pub const DEFAULT_COLLECTION: &str = "users";

/// Runs profile searches through the retry scheduler.
///
/// Searches are keyed by scope (`search:<scope>`), so a newer search in the
/// same scope, e.g. the next keystroke in a search box, supersedes the one
/// still in flight.
pub struct SearchExecutor {
    backend: Arc<dyn SearchBackend>,
    scheduler: RetryScheduler,
    limits: SearchConfig,
    collection: String,
}

impl SearchExecutor {
    pub fn new(
        backend: impl SearchBackend,
        scheduler: RetryScheduler,
        limits: SearchConfig,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            scheduler,
            limits,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Validate `filters` without touching the backend.
    pub fn plan(&self, filters: &SearchFilters) -> Result<SearchQuery> {
        build_query(&self.collection, filters, &self.limits).map_err(|e| ActionError::Failed {
            error: ClassifiedError::new(ErrorKind::InvalidInput, e.to_string()),
            attempts: 0,
        })
    }

    pub async fn search(&self, scope: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>> {
        let query = self.plan(filters)?;
        let key = format!("search:{scope}");
        tracing::debug!(key = %key, query = %query.describe(), "running search");

        let mut hits = self
            .scheduler
            .execute_with_retry(&key, || self.backend.run(&query))
            .await?;
        if let Some(limit) = query.limit() {
            hits.truncate(limit as usize);
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amaplayer_core::config::RetryConfig;
    use amaplayer_core::types::Role;
    use amaplayer_core::RawError;
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeSearch {
        failures: Mutex<VecDeque<RawError>>,
        queries: Arc<Mutex<Vec<String>>>,
        latency: Duration,
        hits: Vec<SearchHit>,
    }

    impl FakeSearch {
        fn new(hits: Vec<SearchHit>) -> Self {
            Self {
                failures: Mutex::new(VecDeque::new()),
                queries: Arc::new(Mutex::new(Vec::new())),
                latency: Duration::ZERO,
                hits,
            }
        }
    }

    impl SearchBackend for FakeSearch {
        fn run(&self, query: &SearchQuery) -> BoxFuture<'static, std::result::Result<Vec<SearchHit>, RawError>> {
            self.queries.lock().unwrap().push(query.describe());
            let failure = self.failures.lock().unwrap().pop_front();
            let hits = self.hits.clone();
            let latency = self.latency;
            Box::pin(async move {
                tokio::time::sleep(latency).await;
                match failure {
                    Some(raw) => Err(raw),
                    None => Ok(hits),
                }
            })
        }
    }

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            role: Role::Athlete,
            sports: vec!["football".into()],
        }
    }

    fn executor(backend: FakeSearch) -> SearchExecutor {
        SearchExecutor::new(
            backend,
            RetryScheduler::new(RetryConfig::default()),
            SearchConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_filters_never_reach_backend() {
        let backend = FakeSearch::new(vec![]);
        let queries = Arc::clone(&backend.queries);
        let exec = executor(backend);
        let err = exec
            .search(
                "people",
                &SearchFilters {
                    min_age: Some(40),
                    max_age: Some(20),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        let classified = err.classified().unwrap();
        assert_eq!(classified.kind, ErrorKind::InvalidInput);
        assert!(!classified.retryable);
        assert!(queries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let backend = FakeSearch::new(vec![hit("a"), hit("b")]);
        backend
            .failures
            .lock()
            .unwrap()
            .push_back(RawError::from_code("deadline-exceeded"));
        let queries = Arc::clone(&backend.queries);
        let exec = executor(backend);

        let hits = exec
            .search(
                "people",
                &SearchFilters {
                    role: Some(Role::Athlete),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        let queries = queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].contains("where(role == \"athlete\")"));
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_truncated_to_limit() {
        let exec = executor(FakeSearch::new(vec![hit("a"), hit("b"), hit("c")]));
        let hits = exec
            .search(
                "people",
                &SearchFilters {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_search_in_same_scope_supersedes() {
        let mut backend = FakeSearch::new(vec![hit("a")]);
        backend.latency = Duration::from_millis(200);
        let exec = Arc::new(executor(backend));

        let first = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move {
                exec.search(
                    "people",
                    &SearchFilters {
                        text: Some("a".into()),
                        ..Default::default()
                    },
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = exec
            .search(
                "people",
                &SearchFilters {
                    text: Some("am".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert!(matches!(
            first.await.unwrap(),
            Err(ActionError::Superseded { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn different_scopes_run_independently() {
        let mut backend = FakeSearch::new(vec![hit("a")]);
        backend.latency = Duration::from_millis(100);
        let exec = executor(backend);
        let filters = SearchFilters::default();
        let (a, b) = tokio::join!(exec.search("people", &filters), exec.search("coaches", &filters));
        assert!(a.is_ok());
        assert!(b.is_ok());
    }
}
