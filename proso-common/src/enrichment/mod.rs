//! Enrichment of serialized domain objects
//!
//! Responses are lists of [`Record`]s. Before they are turned into JSON, the
//! [`EnricherRegistry`] runs every registered [`Enricher`] over the objects of
//! the types it was registered for. An enricher always receives the whole
//! batch of matching objects at once, so it can look up whatever it needs in a
//! single query instead of one query per object.
//!
//! The registry is built once at start-up and handed to the serialization path
//! explicitly. Enrichers run in dependency order, then by priority, then in
//! registration order. Two enrichers writing the same field: the later one
//! wins.

mod record;

pub use record::{EnrichedObject, Record, ToRecord};

use crate::request::RequestContext;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Adds computed fields to a batch of serialized objects
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Unique name, used for dependencies and logging
    fn name(&self) -> &str;

    /// Enrich all objects in place
    ///
    /// `nested` is true when some of the objects are embedded in other
    /// objects rather than being top-level items of the response.
    async fn enrich(
        &self,
        ctx: &RequestContext,
        objects: &mut [&mut EnrichedObject],
        nested: bool,
    ) -> Result<()>;
}

struct Registration {
    name: String,
    object_types: Vec<String>,
    dependencies: Vec<String>,
    priority: i32,
    enricher: Arc<dyn Enricher>,
}

impl Registration {
    /// Empty type list means the enricher applies to every object
    fn applies_to(&self, object_type: &str) -> bool {
        self.object_types.is_empty() || self.object_types.iter().any(|t| t == object_type)
    }
}

/// Collects registrations and computes the run order
#[derive(Default)]
pub struct EnricherRegistryBuilder {
    registrations: Vec<Registration>,
}

impl EnricherRegistryBuilder {
    /// Register an enricher for the given object types
    pub fn register(self, object_types: &[&str], enricher: Arc<dyn Enricher>) -> Self {
        self.register_with(object_types, enricher, &[], 0)
    }

    /// Register an enricher which has to run after `dependencies`
    ///
    /// Registering a name again merges object types and dependencies.
    pub fn register_with(
        mut self,
        object_types: &[&str],
        enricher: Arc<dyn Enricher>,
        dependencies: &[&str],
        priority: i32,
    ) -> Self {
        let name = enricher.name().to_string();
        if let Some(existing) = self.registrations.iter_mut().find(|r| r.name == name) {
            for t in object_types {
                if !existing.object_types.iter().any(|e| e == t) {
                    existing.object_types.push(t.to_string());
                }
            }
            for d in dependencies {
                if !existing.dependencies.iter().any(|e| e == d) {
                    existing.dependencies.push(d.to_string());
                }
            }
            return self;
        }
        self.registrations.push(Registration {
            name,
            object_types: object_types.iter().map(|t| t.to_string()).collect(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            priority,
            enricher,
        });
        self
    }

    /// Order the enrichers; fails on unknown dependencies or cycles
    pub fn build(self) -> Result<EnricherRegistry> {
        let index: HashMap<&str, usize> = self
            .registrations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect();

        for registration in &self.registrations {
            for dependency in &registration.dependencies {
                if !index.contains_key(dependency.as_str()) {
                    return Err(Error::Config(format!(
                        "Enricher '{}' depends on unknown enricher '{}'",
                        registration.name, dependency
                    )));
                }
            }
        }

        // Stable sort keeps registration order among equal priorities
        let mut by_priority: Vec<usize> = (0..self.registrations.len()).collect();
        by_priority.sort_by_key(|i| self.registrations[*i].priority);

        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        let mut order = Vec::with_capacity(self.registrations.len());
        for i in by_priority {
            visit(i, &self.registrations, &index, &mut visited, &mut stack, &mut order)?;
        }

        let mut slots: Vec<Option<Registration>> =
            self.registrations.into_iter().map(Some).collect();
        let ordered = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect::<Vec<_>>();

        debug!(
            "Enricher order: {}",
            ordered.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(EnricherRegistry { ordered })
    }
}

fn visit(
    i: usize,
    registrations: &[Registration],
    index: &HashMap<&str, usize>,
    visited: &mut HashSet<usize>,
    stack: &mut HashSet<usize>,
    order: &mut Vec<usize>,
) -> Result<()> {
    if visited.contains(&i) {
        return Ok(());
    }
    if !stack.insert(i) {
        return Err(Error::Config(format!(
            "There is a cycle in dependencies of enrichers ('{}')",
            registrations[i].name
        )));
    }
    let mut dependencies: Vec<usize> = registrations[i]
        .dependencies
        .iter()
        .map(|d| index[d.as_str()])
        .collect();
    dependencies.sort_by_key(|d| registrations[*d].priority);
    for d in dependencies {
        visit(d, registrations, index, visited, stack, order)?;
    }
    stack.remove(&i);
    visited.insert(i);
    order.push(i);
    Ok(())
}

/// Ordered set of enrichers, shared by all requests
pub struct EnricherRegistry {
    ordered: Vec<Registration>,
}

impl EnricherRegistry {
    pub fn builder() -> EnricherRegistryBuilder {
        EnricherRegistryBuilder::default()
    }

    /// Registry without any enricher
    pub fn empty() -> Self {
        Self { ordered: Vec::new() }
    }

    /// Enricher names in run order
    pub fn names(&self) -> Vec<&str> {
        self.ordered.iter().map(|r| r.name.as_str()).collect()
    }

    /// Run every enricher over the matching objects of `records`
    ///
    /// Each enricher is called at most once, with all matching objects found
    /// anywhere in the record trees. The first failure aborts the enrichment.
    pub async fn enrich(&self, ctx: &RequestContext, records: &mut [Record], nested: bool) -> Result<()> {
        let started = Instant::now();
        for registration in &self.ordered {
            let mut batch: Vec<&mut EnrichedObject> = Vec::new();
            let mut found_nested = false;
            collect(records, registration, 0, &mut batch, &mut found_nested);
            if batch.is_empty() {
                continue;
            }

            let enricher_started = Instant::now();
            registration
                .enricher
                .enrich(ctx, batch.as_mut_slice(), nested || found_nested)
                .await?;
            debug!(
                "enrichment \"{}\" of {} objects took {:?}",
                registration.name,
                batch.len(),
                enricher_started.elapsed()
            );
        }
        debug!(
            "The whole enrichment of json objects by their object_type took {:?}",
            started.elapsed()
        );
        Ok(())
    }

    /// Enrich and serialize
    pub async fn enrich_json(&self, ctx: &RequestContext, mut records: Vec<Record>, nested: bool) -> Result<Vec<Value>> {
        self.enrich(ctx, &mut records, nested).await?;
        Ok(records.into_iter().map(Record::into_json).collect())
    }
}

fn collect<'a>(
    records: &'a mut [Record],
    registration: &Registration,
    depth: usize,
    out: &mut Vec<&'a mut EnrichedObject>,
    found_nested: &mut bool,
) {
    for record in records {
        let Record { object, children } = record;
        if registration.applies_to(object.object_type()) {
            if depth > 0 {
                *found_nested = true;
            }
            out.push(object);
        }
        for (_, nested) in children {
            collect(nested, registration, depth + 1, out, found_nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records its name into every object's "trace" list
    struct Tracer(&'static str);

    #[async_trait]
    impl Enricher for Tracer {
        fn name(&self) -> &str {
            self.0
        }

        async fn enrich(
            &self,
            _ctx: &RequestContext,
            objects: &mut [&mut EnrichedObject],
            _nested: bool,
        ) -> Result<()> {
            for object in objects.iter_mut() {
                let mut trace = object
                    .get("trace")
                    .and_then(|t| t.as_array().cloned())
                    .unwrap_or_default();
                trace.push(json!(self.0));
                object.set_extra("trace", Value::Array(trace));
            }
            Ok(())
        }
    }

    fn tracer(name: &'static str) -> Arc<dyn Enricher> {
        Arc::new(Tracer(name))
    }

    #[test]
    fn test_registration_order_without_dependencies() {
        let registry = EnricherRegistry::builder()
            .register(&["a"], tracer("first"))
            .register(&["a"], tracer("second"))
            .register(&[], tracer("third"))
            .build()
            .unwrap();
        assert_eq!(registry.names(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dependencies_run_first() {
        let registry = EnricherRegistry::builder()
            .register_with(&["a"], tracer("local"), &["global"], 0)
            .register(&["a", "b"], tracer("global"))
            .build()
            .unwrap();
        assert_eq!(registry.names(), vec!["global", "local"]);
    }

    #[test]
    fn test_priority_orders_independent_enrichers() {
        let registry = EnricherRegistry::builder()
            .register_with(&["a"], tracer("late"), &[], 10)
            .register_with(&["a"], tracer("early"), &[], -1)
            .build()
            .unwrap();
        assert_eq!(registry.names(), vec!["early", "late"]);
    }

    #[test]
    fn test_unknown_dependency_fails() {
        let result = EnricherRegistry::builder()
            .register_with(&["a"], tracer("x"), &["missing"], 0)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cycle_fails() {
        let result = EnricherRegistry::builder()
            .register_with(&["a"], tracer("x"), &["y"], 0)
            .register_with(&["a"], tracer("y"), &["x"], 0)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_name_merges_types() {
        let registry = EnricherRegistry::builder()
            .register(&["a"], tracer("x"))
            .register(&["b"], tracer("x"))
            .build()
            .unwrap();
        assert_eq!(registry.names(), vec!["x"]);
        assert!(registry.ordered[0].applies_to("a"));
        assert!(registry.ordered[0].applies_to("b"));
        assert!(!registry.ordered[0].applies_to("c"));
    }

    /// Writes a fixed value into the "x" field
    struct Writer(&'static str);

    #[async_trait]
    impl Enricher for Writer {
        fn name(&self) -> &str {
            self.0
        }

        async fn enrich(
            &self,
            _ctx: &RequestContext,
            objects: &mut [&mut EnrichedObject],
            _nested: bool,
        ) -> Result<()> {
            for object in objects.iter_mut() {
                object.set_extra("x", json!(self.0));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_later_enricher_wins_on_same_field() {
        let registry = EnricherRegistry::builder()
            .register(&["thing"], Arc::new(Writer("first")))
            .register(&["thing"], Arc::new(Writer("second")))
            .build()
            .unwrap();
        let records = vec![Record::from_json("thing", 1, json!({"x": "base"})).unwrap()];

        let json = registry
            .enrich_json(&RequestContext::anonymous(), records, false)
            .await
            .unwrap();
        assert_eq!(json[0]["x"], "second");
    }

    #[tokio::test]
    async fn test_enrich_matches_nested_objects() {
        let registry = EnricherRegistry::builder()
            .register(&["child"], tracer("child_only"))
            .build()
            .unwrap();

        let child = Record::from_json("child", 2, json!({})).unwrap();
        let parent = Record::from_json("parent", 1, json!({}))
            .unwrap()
            .with_children("children", vec![child]);

        let json = registry
            .enrich_json(&RequestContext::anonymous(), vec![parent], false)
            .await
            .unwrap();
        assert!(json[0].get("trace").is_none());
        assert_eq!(json[0]["children"][0]["trace"], json!(["child_only"]));
    }

    #[tokio::test]
    async fn test_enrich_skips_when_nothing_matches() {
        struct Failing;

        #[async_trait]
        impl Enricher for Failing {
            fn name(&self) -> &str {
                "failing"
            }

            async fn enrich(
                &self,
                _ctx: &RequestContext,
                _objects: &mut [&mut EnrichedObject],
                _nested: bool,
            ) -> Result<()> {
                Err(Error::Internal("must not be called".to_string()))
            }
        }

        let registry = EnricherRegistry::builder()
            .register(&["other"], Arc::new(Failing))
            .build()
            .unwrap();
        let mut records = vec![Record::from_json("thing", 1, json!({})).unwrap()];
        registry
            .enrich(&RequestContext::anonymous(), &mut records, false)
            .await
            .unwrap();
    }
}
