//! Integration tests for casecache


use casecache::cache::RemovalListener;
use casecache::config::Config;
use casecache::{
    CaseGraph, ImportSource, ImporterRegistry, Network, NetworkService, NodeId, RemovalCause,
    Script,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{MemoryImporter, ToyRunner};

struct Harness {
    service: Arc<NetworkService>,
    importer: Arc<MemoryImporter>,
    runner: Arc<ToyRunner>,
}

fn harness_with(importer: MemoryImporter, config: Config) -> Harness {
    let importer = Arc::new(importer);
    importer.put("grid", grid("grid"));
    let runner = Arc::new(ToyRunner::new());
    let service = NetworkService::new(
        CaseGraph::new(),
        ImporterRegistry::new().with(importer.clone()),
        runner.clone(),
        &config,
    );
    Harness {
        service: Arc::new(service),
        importer,
        runner,
    }
}

fn harness() -> Harness {
    harness_with(MemoryImporter::new(), Config::default())
}

fn grid(id: &str) -> Network {
    let mut network = Network::new(id, "memory");
    network.set("lines", 3);
    network
}

fn source(location: &str) -> ImportSource {
    ImportSource::new("memory", location)
}

fn script(content: &str) -> Script {
    Script::groovy(content.lines().next().unwrap_or("empty"), content)
}

impl Harness {
    fn root(&self, location: &str) -> NodeId {
        self.service
            .add_imported_case(location, source(location))
            .unwrap()
    }

    fn derived(&self, parent: NodeId, content: &str) -> NodeId {
        self.service
            .add_virtual_case(content, parent, script(content))
            .unwrap()
    }
}

mod resolution {
    use super::*;

    #[tokio::test]
    async fn repeated_reads_resolve_once() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "print o1\nset lines 4");

        let first = h.service.get_network(b).await.unwrap();
        let second = h.service.get_network(b).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.get("lines"), Some(&serde_json::json!(4)));
        assert_eq!(h.service.get_script_output(b).await.unwrap(), "o1");
        assert_eq!(h.importer.calls(), 1);
        assert_eq!(h.runner.total_calls(), 1);
    }

    #[tokio::test]
    async fn output_accumulates_root_to_leaf() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "print o1");
        let c = h.derived(b, "print o2");

        assert_eq!(h.service.get_script_output(c).await.unwrap(), "o1o2");
        assert_eq!(h.service.get_script_output(b).await.unwrap(), "o1");
        assert_eq!(h.service.get_script_output(a).await.unwrap(), "");
    }

    #[tokio::test]
    async fn parent_output_does_not_depend_on_child() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "print o1");
        h.derived(b, "print o2");

        // The child was never resolved
        assert_eq!(h.service.get_script_output(b).await.unwrap(), "o1");
    }

    #[tokio::test]
    async fn script_error_short_circuits_descendants() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "print partial\nfail bad line 2");
        let c = h.derived(b, "print o2");

        let error = h.service.get_script_error(c).await.unwrap().unwrap();
        assert_eq!(error.message, "bad line 2");
        assert_eq!(h.service.get_script_output(c).await.unwrap(), "partial");
        assert_eq!(
            h.service.get_script_error(b).await.unwrap(),
            Some(error.clone())
        );
        assert_eq!(h.runner.calls_of("print o2"), 0);
    }

    #[tokio::test]
    async fn failed_output_keeps_ancestor_output() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "print o1");
        let c = h.derived(b, "print partial\nfail x");
        let d = h.derived(c, "print o3");

        assert_eq!(h.service.get_script_output(d).await.unwrap(), "o1partial");
        assert_eq!(h.service.get_script_output(c).await.unwrap(), "o1partial");
        assert_eq!(h.service.get_script_error(d).await.unwrap().unwrap().message, "x");
        assert_eq!(h.runner.calls_of("print o3"), 0);
    }

    #[tokio::test]
    async fn failed_case_serves_placeholder_network() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "fail boom");

        let network = h.service.get_network(b).await.unwrap();
        assert_eq!(*network, Network::placeholder());
        assert!(h.service.get_script_error(a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn script_errors_are_cached_without_retry() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "fail boom");

        for _ in 0..3 {
            assert!(h.service.get_script_error(b).await.unwrap().is_some());
        }
        assert_eq!(h.runner.calls_of("fail boom"), 1);
    }

    #[tokio::test]
    async fn import_failure_is_raised_and_retried() {
        let h = harness();
        let missing = h.root("nowhere");

        let err = h.service.get_network(missing).await.unwrap_err();
        assert!(err.is_import_failure());
        assert!(!h.service.cache().contains(missing).unwrap());

        h.importer.put("nowhere", grid("late"));
        assert_eq!(h.service.get_network(missing).await.unwrap().id, "late");
        assert_eq!(h.importer.calls(), 2);
    }

    #[tokio::test]
    async fn import_failure_reaches_descendants() {
        let h = harness();
        let a = h.root("nowhere");
        let b = h.derived(a, "print o1");

        assert!(h.service.get_script_output(b).await.unwrap_err().is_import_failure());
        assert_eq!(h.runner.total_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_format_is_import_failure() {
        let h = harness();
        let a = h
            .service
            .add_imported_case("ucte", ImportSource::new("ucte", "grid"))
            .unwrap();
        let err = h.service.get_network(a).await.unwrap_err();
        assert!(err.is_import_failure());
        assert!(err.hint().is_some());
    }
}

mod concurrency {
    use super::*;
    use futures_util::future::join_all;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads_share_one_chain_execution() {
        let h = harness_with(
            MemoryImporter::new().with_delay(Duration::from_millis(50)),
            Config::default(),
        );
        let a = h.root("grid");
        let b = h.derived(a, "sleep 20\nprint o1");

        let reads = (0..16).map(|_| {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.get_network(b).await })
        });
        let networks: Vec<_> = join_all(reads)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert!(networks.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(h.importer.calls(), 1);
        assert_eq!(h.runner.total_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_case_does_not_block_other_cases() {
        let h = harness();
        h.importer.put("other", grid("other"));
        let a = h.root("grid");
        let slow = h.derived(a, "sleep 2000");
        let other = h.root("other");

        let service = Arc::clone(&h.service);
        let pending = tokio::spawn(async move { service.get_network(slow).await });

        let fast = tokio::time::timeout(Duration::from_millis(1000), h.service.get_network(other))
            .await
            .expect("unrelated case waited on the slow script");
        assert_eq!(fast.unwrap().id, "other");

        pending.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn siblings_share_their_parent() {
        let h = harness_with(
            MemoryImporter::new().with_delay(Duration::from_millis(50)),
            Config::default(),
        );
        let a = h.root("grid");
        let children: Vec<NodeId> = (0..8)
            .map(|i| h.derived(a, &format!("print child{}", i)))
            .collect();

        let reads = children.iter().map(|&child| {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.get_script_output(child).await })
        });
        for (i, output) in join_all(reads).await.into_iter().enumerate() {
            assert_eq!(output.unwrap().unwrap(), format!("child{}", i));
        }
        assert_eq!(h.importer.calls(), 1);
    }
}

mod invalidation {
    use super::*;
    use casecache::CaseCacheError;
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn invalidation_forces_recomputation() {
        let h = harness();
        let a = h.root("grid");
        assert_eq!(h.service.get_network(a).await.unwrap().id, "grid");

        h.importer.put("grid", grid("grid-v2"));
        assert_eq!(h.service.get_network(a).await.unwrap().id, "grid");

        h.service.invalidate_cache(a).unwrap();
        assert_eq!(h.service.get_network(a).await.unwrap().id, "grid-v2");
        assert_eq!(h.importer.calls(), 2);
    }

    #[tokio::test]
    async fn invalidation_does_not_cascade() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "print o1");
        h.service.get_network(b).await.unwrap();

        h.importer.put("grid", grid("grid-v2"));
        h.service.invalidate_cache(a).unwrap();

        // b keeps the network derived from the first import
        assert_eq!(h.service.get_network(b).await.unwrap().id, "grid");
        assert_eq!(h.service.get_network(a).await.unwrap().id, "grid-v2");
        assert_eq!(h.runner.total_calls(), 1);
    }

    #[tokio::test]
    async fn cascading_invalidation_reaches_descendants() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "print o1");
        let c = h.derived(b, "print o2");
        h.service.get_network(c).await.unwrap();

        h.importer.put("grid", grid("grid-v2"));
        h.service.invalidate_cache_cascading(a).unwrap();

        assert_eq!(h.service.get_network(c).await.unwrap().id, "grid-v2");
        assert_eq!(h.runner.total_calls(), 4);
    }

    #[tokio::test]
    async fn updating_a_script_reapplies_it() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "fail typo");
        assert!(h.service.get_script_error(b).await.unwrap().is_some());

        h.service.update_script(b, script("print fixed")).unwrap();
        assert!(h.service.get_script_error(b).await.unwrap().is_none());
        assert_eq!(h.service.get_script_output(b).await.unwrap(), "fixed");
        assert_eq!(h.importer.calls(), 1);
    }

    fn gated_harness() -> (Harness, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness_with(
            MemoryImporter::new().with_gate(Arc::clone(&gate)),
            Config::default(),
        );
        (h, gate)
    }

    async fn until_import_started(h: &Harness) {
        while h.importer.calls() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn script_update_during_resolution_is_not_lost() {
        let (h, gate) = gated_harness();
        let a = h.root("grid");
        let b = h.derived(a, "print OLD");

        let service = Arc::clone(&h.service);
        let reader = tokio::spawn(async move { service.get_script_output(b).await });
        until_import_started(&h).await;

        h.service.update_script(b, script("print NEW")).unwrap();
        gate.add_permits(1);

        assert_eq!(reader.await.unwrap().unwrap(), "NEW");
        assert_eq!(h.service.get_script_output(b).await.unwrap(), "NEW");
        assert_eq!(h.runner.calls_of("print OLD"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn source_update_during_resolution_is_not_lost() {
        let (h, gate) = gated_harness();
        h.importer.put("other", grid("other"));
        let a = h.root("grid");
        let b = h.derived(a, "print o1");

        let service = Arc::clone(&h.service);
        let reader = tokio::spawn(async move { service.get_network(b).await });
        until_import_started(&h).await;

        // The root import already started: the edit invalidates its entry
        h.service.update_source(a, source("other")).unwrap();
        gate.add_permits(1);
        reader.await.unwrap().unwrap();

        assert_eq!(h.service.get_network(a).await.unwrap().id, "other");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn removal_during_resolution_leaves_no_entry() {
        let (h, gate) = gated_harness();
        let a = h.root("grid");
        let b = h.derived(a, "print o1");

        let service = Arc::clone(&h.service);
        let reader = tokio::spawn(async move { service.get_network(b).await });
        until_import_started(&h).await;

        h.service.remove_case(b).unwrap();
        gate.add_permits(1);

        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, CaseCacheError::NodeNotFound(id) if id == b));
        assert!(!h.service.cache().contains(b).unwrap());
        assert_eq!(h.runner.total_calls(), 0);
    }

    #[tokio::test]
    async fn updating_a_source_reimports() {
        let h = harness();
        h.importer.put("other", grid("other"));
        let a = h.root("grid");
        assert_eq!(h.service.get_network(a).await.unwrap().id, "grid");

        h.service.update_source(a, source("other")).unwrap();
        assert_eq!(h.service.get_network(a).await.unwrap().id, "other");
    }
}

mod eviction {
    use super::*;

    fn config(max_entries: usize, idle_timeout_secs: u64) -> Config {
        let mut config = Config::default();
        config.cache.max_entries = max_entries;
        config.cache.idle_timeout_secs = idle_timeout_secs;
        config
    }

    fn recorder() -> (RemovalListener, Arc<Mutex<Vec<(NodeId, RemovalCause)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: RemovalListener =
            Arc::new(move |id, cause| sink.lock().unwrap().push((id, cause)));
        (listener, seen)
    }

    #[tokio::test]
    async fn capacity_of_one_evicts_previous_case() {
        let h = harness_with(MemoryImporter::new(), config(1, 0));
        h.importer.put("other", grid("other"));
        let a = h.root("grid");
        let b = h.root("other");

        h.service.get_network(a).await.unwrap();
        h.service.get_network(b).await.unwrap();
        assert!(!h.service.cache().contains(a).unwrap());
        assert_eq!(h.importer.calls(), 2);

        h.service.get_network(a).await.unwrap();
        assert_eq!(h.importer.calls(), 3);
    }

    #[tokio::test]
    async fn evictions_are_reported() {
        let importer = Arc::new(MemoryImporter::new());
        importer.put("grid", grid("grid"));
        importer.put("other", grid("other"));
        let (listener, seen) = recorder();
        let service = NetworkService::new(
            CaseGraph::new(),
            ImporterRegistry::new().with(importer.clone()),
            Arc::new(ToyRunner::new()),
            &config(1, 0),
        )
        .with_removal_listener(listener);

        let a = service.add_imported_case("a", source("grid")).unwrap();
        let b = service.add_imported_case("b", source("other")).unwrap();
        service.get_network(a).await.unwrap();
        service.get_network(b).await.unwrap();
        service.invalidate_cache(b).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(a, RemovalCause::Size), (b, RemovalCause::Explicit)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_cases_are_recomputed() {
        let h = harness_with(MemoryImporter::new(), config(0, 60));
        let a = h.root("grid");

        h.service.get_network(a).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        h.service.get_network(a).await.unwrap();
        assert_eq!(h.importer.calls(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        h.service.get_network(a).await.unwrap();
        assert_eq!(h.importer.calls(), 2);
    }
}

mod query {
    use super::*;

    #[tokio::test]
    async fn query_returns_json_value() {
        let h = harness();
        let a = h.root("grid");
        let json = h.service.query_network(a, "get lines").await.unwrap();
        assert_eq!(json.as_deref(), Some("3"));

        let json = h
            .service
            .query_network(a, r#"return {"ok": true}"#)
            .await
            .unwrap();
        assert_eq!(json.as_deref(), Some(r#"{"ok":true}"#));
    }

    #[tokio::test]
    async fn query_without_value_returns_none() {
        let h = harness();
        let a = h.root("grid");
        assert!(h.service.query_network(a, "print hi").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_never_alters_cached_artifact() {
        let h = harness();
        let a = h.root("grid");
        let b = h.derived(a, "print o1");
        let before = h.service.get_network(b).await.unwrap();

        let json = h
            .service
            .query_network(b, "set lines 99\nget lines")
            .await
            .unwrap();
        assert_eq!(json.as_deref(), Some("99"));
        assert!(h
            .service
            .query_network(b, "set lines 42\nfail nope")
            .await
            .unwrap()
            .is_none());

        assert_eq!(h.service.get_network(b).await.unwrap(), before);
        assert_eq!(h.service.get_script_output(b).await.unwrap(), "o1");
        assert!(h.service.get_script_error(b).await.unwrap().is_none());
        assert_eq!(h.runner.calls_of("print o1"), 1);
    }

    #[tokio::test]
    async fn query_failures_are_not_cached() {
        let h = harness();
        let a = h.root("grid");
        for _ in 0..2 {
            assert!(h.service.query_network(a, "fail nope").await.unwrap().is_none());
        }
        assert_eq!(h.runner.calls_of("fail nope"), 2);
    }
}
