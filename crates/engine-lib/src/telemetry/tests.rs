//! Batcher tests against scripted telemetry sources
//!
//! These tests drive the batcher with in-process sources that record every
//! request and answer with scripted pages, failures and cursors.

#[cfg(test)]
mod batcher_tests {
    use crate::error::TelemetryError;
    use crate::models::{ResourceDescriptor, ResourceKind, ResourceRecord, ResourceState};
    use crate::telemetry::{
        async_trait, queries_for, MetricDataPage, MetricDataRequest, MetricDataResult, MetricKind,
        QueryId, TelemetryBatcher, TelemetrySource, TimeWindow,
    };
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    type Responder =
        Box<dyn Fn(&MetricDataRequest, usize) -> Result<MetricDataPage, TelemetryError> + Send + Sync>;

    /// Source answering each call through a closure and logging requests
    struct ScriptedSource {
        responder: Responder,
        requests: Mutex<Vec<MetricDataRequest>>,
        max_queries: usize,
    }

    impl ScriptedSource {
        fn new(
            responder: impl Fn(&MetricDataRequest, usize) -> Result<MetricDataPage, TelemetryError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
                max_queries: 500,
            }
        }

        fn with_max_queries(mut self, max_queries: usize) -> Self {
            self.max_queries = max_queries;
            self
        }

        fn requests(&self) -> Vec<MetricDataRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TelemetrySource for ScriptedSource {
        async fn get_metric_data(
            &self,
            request: &MetricDataRequest,
        ) -> Result<MetricDataPage, TelemetryError> {
            let call = {
                let mut log = self.requests.lock().unwrap();
                log.push(request.clone());
                log.len() - 1
            };
            (self.responder)(request, call)
        }

        fn max_queries_per_call(&self) -> usize {
            self.max_queries
        }
    }

    /// One sample per query, valued by resource index
    fn one_sample_each(request: &MetricDataRequest) -> Vec<MetricDataResult> {
        request
            .queries
            .iter()
            .map(|q| MetricDataResult {
                id: q.id,
                timestamps: vec![request.window.end],
                values: vec![q.id.resource_index as f64],
            })
            .collect()
    }

    fn instances(count: usize) -> Vec<ResourceRecord> {
        (0..count)
            .map(|i| {
                ResourceRecord::new(ResourceDescriptor {
                    id: format!("i-{i}"),
                    kind: ResourceKind::ComputeInstance,
                    state: ResourceState::Running,
                    region: "us-east-1".to_string(),
                    availability_zone: "us-east-1a".to_string(),
                    tenancy: "default".to_string(),
                    instance_type: "t3.micro".to_string(),
                    platform: "Linux/UNIX".to_string(),
                    spot_request_id: None,
                })
                .unwrap()
            })
            .collect()
    }

    fn window() -> TimeWindow {
        TimeWindow::lookback(Utc::now(), 7)
    }

    #[tokio::test]
    async fn test_flushes_at_batch_size_and_on_finish() {
        let source = ScriptedSource::new(|req, _| {
            Ok(MetricDataPage {
                results: one_sample_each(req),
                next_token: None,
            })
        });
        let mut resources = instances(3);
        let queries: Vec<_> = resources
            .iter()
            .enumerate()
            .flat_map(|(i, r)| queries_for(r, i, 3600))
            .collect();
        assert_eq!(queries.len(), 12);

        let mut batcher = TelemetryBatcher::new(&source, 5, window());
        batcher.push_all(queries, &mut resources).await;
        assert_eq!(batcher.pending(), 2);

        let stats = batcher.finish(&mut resources).await;
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.queries_dispatched, 12);
        assert_eq!(stats.results_routed, 12);

        let sizes: Vec<usize> = source.requests().iter().map(|r| r.queries.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);

        for (i, resource) in resources.iter().enumerate() {
            let series = resource.series(MetricKind::MemoryUsedPercent).unwrap();
            assert_eq!(series.values().collect::<Vec<_>>(), vec![i as f64]);
        }
    }

    #[tokio::test]
    async fn test_follows_cursor_and_appends_pages() {
        let source = ScriptedSource::new(|req, call| {
            let next_token = match call {
                0 => Some("page-2".to_string()),
                1 => Some("page-3".to_string()),
                _ => None,
            };
            Ok(MetricDataPage {
                results: one_sample_each(req),
                next_token,
            })
        });
        let mut resources = instances(1);
        let queries = queries_for(&resources[0], 0, 3600);

        let mut batcher = TelemetryBatcher::new(&source, 100, window());
        batcher.push_all(queries, &mut resources).await;
        let stats = batcher.finish(&mut resources).await;

        assert_eq!(stats.batches, 1);
        assert_eq!(stats.requests, 3);

        let tokens: Vec<Option<String>> =
            source.requests().into_iter().map(|r| r.next_token).collect();
        assert_eq!(
            tokens,
            vec![None, Some("page-2".to_string()), Some("page-3".to_string())]
        );
        assert_eq!(resources[0].series(MetricKind::CpuAverage).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stops_on_repeated_cursor() {
        let source = ScriptedSource::new(|req, _| {
            Ok(MetricDataPage {
                results: one_sample_each(req),
                next_token: Some("stuck".to_string()),
            })
        });
        let mut resources = instances(1);

        let mut batcher = TelemetryBatcher::new(&source, 10, window());
        batcher
            .push_all(queries_for(&resources[0], 0, 3600), &mut resources)
            .await;
        let stats = batcher.finish(&mut resources).await;

        // First page hands out "stuck", the second hands it out again
        assert_eq!(stats.requests, 2);
        assert_eq!(resources[0].series(MetricKind::CpuMaximum).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stops_on_all_empty_page() {
        let source = ScriptedSource::new(|req, call| {
            let results = if call == 0 {
                one_sample_each(req)
            } else {
                req.queries.iter().map(|q| MetricDataResult::empty(q.id)).collect()
            };
            Ok(MetricDataPage {
                results,
                next_token: Some(format!("token-{call}")),
            })
        });
        let mut resources = instances(2);
        let queries: Vec<_> = resources
            .iter()
            .enumerate()
            .flat_map(|(i, r)| queries_for(r, i, 3600))
            .collect();

        let mut batcher = TelemetryBatcher::new(&source, 8, window());
        batcher.push_all(queries, &mut resources).await;
        let stats = batcher.finish(&mut resources).await;

        assert_eq!(stats.requests, 2);
        assert_eq!(resources[1].series(MetricKind::CpuMinimum).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_empty_slots_and_continues() {
        let source = ScriptedSource::new(|req, call| {
            if call == 0 {
                Err(TelemetryError::request("connection reset"))
            } else {
                Ok(MetricDataPage {
                    results: one_sample_each(req),
                    next_token: None,
                })
            }
        });
        let mut resources = instances(2);
        let queries: Vec<_> = resources
            .iter()
            .enumerate()
            .flat_map(|(i, r)| queries_for(r, i, 3600))
            .collect();

        let mut batcher = TelemetryBatcher::new(&source, 4, window());
        batcher.push_all(queries, &mut resources).await;
        let stats = batcher.finish(&mut resources).await;

        assert_eq!(stats.batches, 2);
        assert_eq!(stats.failed_requests, 1);

        // First resource's batch failed: slots exist but hold nothing
        let series = resources[0].series(MetricKind::CpuMaximum).unwrap();
        assert!(series.is_empty());
        assert!(resources[1].has_data(MetricKind::CpuMaximum));
    }

    #[tokio::test]
    async fn test_unrecognized_metric_yields_empty_slot() {
        // Source knows CPU but not the agent memory metric
        let source = ScriptedSource::new(|req, _| {
            let results = req
                .queries
                .iter()
                .map(|q| {
                    if q.namespace == "CWAgent" {
                        MetricDataResult::empty(q.id)
                    } else {
                        MetricDataResult {
                            id: q.id,
                            timestamps: vec![req.window.end],
                            values: vec![3.0],
                        }
                    }
                })
                .collect();
            Ok(MetricDataPage {
                results,
                next_token: None,
            })
        });
        let mut resources = instances(1);

        let mut batcher = TelemetryBatcher::new(&source, 10, window());
        batcher
            .push_all(queries_for(&resources[0], 0, 3600), &mut resources)
            .await;
        batcher.finish(&mut resources).await;

        assert!(resources[0].series(MetricKind::MemoryUsedPercent).is_some());
        assert!(!resources[0].has_data(MetricKind::MemoryUsedPercent));
        assert!(resources[0].has_data(MetricKind::CpuAverage));
    }

    #[tokio::test]
    async fn test_drops_results_for_unknown_index() {
        let source = ScriptedSource::new(|req, _| {
            let mut results = one_sample_each(req);
            results.push(MetricDataResult {
                id: QueryId::new(MetricKind::CpuAverage, 99),
                timestamps: vec![req.window.end],
                values: vec![1.0],
            });
            Ok(MetricDataPage {
                results,
                next_token: None,
            })
        });
        let mut resources = instances(1);

        let mut batcher = TelemetryBatcher::new(&source, 10, window());
        batcher
            .push_all(queries_for(&resources[0], 0, 3600), &mut resources)
            .await;
        let stats = batcher.finish(&mut resources).await;

        assert_eq!(stats.results_routed, 4);
        assert_eq!(stats.results_dropped, 1);
    }

    #[tokio::test]
    async fn test_batch_size_clamped_to_source_limit() {
        let source = ScriptedSource::new(|req, _| {
            Ok(MetricDataPage {
                results: one_sample_each(req),
                next_token: None,
            })
        })
        .with_max_queries(3);

        let batcher = TelemetryBatcher::new(&source, 480, window());
        assert_eq!(batcher.batch_size(), 3);

        let batcher = TelemetryBatcher::new(&source, 0, window());
        assert_eq!(batcher.batch_size(), 1);
    }

    #[tokio::test]
    async fn test_every_request_covers_same_window() {
        let end = Utc::now();
        let source = ScriptedSource::new(|req, call| {
            Ok(MetricDataPage {
                results: one_sample_each(req),
                next_token: (call == 0).then(|| "next".to_string()),
            })
        });
        let mut resources = instances(1);

        let mut batcher = TelemetryBatcher::new(&source, 10, TimeWindow::lookback(end, 7));
        batcher
            .push_all(queries_for(&resources[0], 0, 3600), &mut resources)
            .await;
        batcher.finish(&mut resources).await;

        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert_eq!(request.window.end, end);
            assert_eq!(request.window.start, end - Duration::days(7));
            assert_eq!(request.queries.len(), 4);
        }
    }
}
