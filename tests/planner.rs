mod common;

use std::collections::HashMap;

use proptest::prelude::*;

use scandag::dag::Scheduler;
use scandag::errors::ScanError;
use scandag::registry::{
    AnalyzerDescriptor, AnalyzerRegistry, AnalyzerSelection, Profile, ProfileResolver,
};

use common::{Behaviour, HOUR, RegistryBuilder};

/// sbom -> {vulns, licenses} -> report, plus an unrelated secrets scanner.
fn supply_chain() -> AnalyzerRegistry {
    RegistryBuilder::new()
        .analyzer("sbom", &[], Behaviour::Succeed)
        .analyzer("secrets", &[], Behaviour::Succeed)
        .analyzer("vulns", &["sbom"], Behaviour::Succeed)
        .analyzer("licenses", &["sbom"], Behaviour::Succeed)
        .analyzer("report", &["vulns", "licenses"], Behaviour::Succeed)
        .build()
        .0
}

#[test]
fn plan_layers_transitive_dependencies_into_waves() {
    let registry = supply_chain();
    let plan = Scheduler::new(&registry).plan(&["report"]).unwrap();

    assert_eq!(
        plan.as_names(),
        vec![
            vec!["sbom".to_string()],
            vec!["vulns".to_string(), "licenses".to_string()],
            vec!["report".to_string()],
        ]
    );
    assert_eq!(plan.requested(), ["report".to_string()]);
    assert!(plan.is_requested("report"));
    assert!(!plan.is_requested("sbom"));
    assert!(!plan.contains("secrets"));
    assert_eq!(plan.wave_of("licenses"), Some(1));
}

#[test]
fn plan_orders_ties_by_registration() {
    let (registry, _) = RegistryBuilder::new()
        .analyzer("zeta", &[], Behaviour::Succeed)
        .analyzer("alpha", &[], Behaviour::Succeed)
        .analyzer("mid", &[], Behaviour::Succeed)
        .build();

    let plan = Scheduler::new(&registry)
        .plan(&["mid", "alpha", "zeta"])
        .unwrap();
    assert_eq!(
        plan.as_names(),
        vec![vec!["zeta".to_string(), "alpha".to_string(), "mid".to_string()]]
    );
    // Requested order is kept as given, duplicates dropped.
    let again = Scheduler::new(&registry)
        .plan(&["mid", "mid", "alpha"])
        .unwrap();
    assert_eq!(again.requested(), ["mid".to_string(), "alpha".to_string()]);
}

#[test]
fn plan_is_deterministic() {
    let registry = supply_chain();
    let scheduler = Scheduler::new(&registry);
    let first = scheduler.plan(&["report", "secrets"]).unwrap();
    let second = scheduler.plan(&["report", "secrets"]).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.to_string(),
        "wave 0: sbom, secrets\nwave 1: vulns, licenses\nwave 2: report\n"
    );
}

#[test]
fn plan_rejects_unknown_requested_analyzer() {
    let registry = supply_chain();
    let err = Scheduler::new(&registry).plan(&["nope"]).unwrap_err();
    assert!(matches!(err, ScanError::UnknownId(id) if id == "nope"));
}

#[test]
fn plan_rejects_unregistered_dependency() {
    let (registry, _) = RegistryBuilder::new()
        .analyzer("vulns", &["ghost"], Behaviour::Succeed)
        .build();

    let err = Scheduler::new(&registry).plan(&["vulns"]).unwrap_err();
    match err {
        ScanError::UnknownDependency { id, missing } => {
            assert_eq!(id, "vulns");
            assert_eq!(missing, "ghost");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
    assert!(matches!(
        registry.validate(),
        Err(ScanError::UnknownDependency { .. })
    ));
}

#[test]
fn plan_names_cycle_members_only() {
    let (registry, _) = RegistryBuilder::new()
        .analyzer("a", &["b"], Behaviour::Succeed)
        .analyzer("b", &["a"], Behaviour::Succeed)
        .analyzer("downstream", &["a"], Behaviour::Succeed)
        .build();

    let err = Scheduler::new(&registry).plan(&["downstream"]).unwrap_err();
    match err {
        ScanError::CycleDetected { ids } => assert_eq!(ids, vec!["a", "b"]),
        other => panic!("expected CycleDetected, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let (registry, _) = RegistryBuilder::new()
        .descriptor(
            AnalyzerDescriptor::new("loop", HOUR).with_dependency("loop"),
            Behaviour::Succeed,
        )
        .build();

    match registry.validate() {
        Err(ScanError::CycleDetected { ids }) => assert_eq!(ids, vec!["loop"]),
        other => panic!("expected CycleDetected, got {other:?}"),
    }
}

#[test]
fn duplicate_registration_is_rejected() {
    let (mut registry, log) = RegistryBuilder::new()
        .analyzer("sbom", &[], Behaviour::Succeed)
        .build();
    let fake = scandag_test_utils::fake_analyzer::FakeAnalyzer::new(Behaviour::Succeed, log);

    let err = registry
        .register(AnalyzerDescriptor::new("sbom", HOUR), fake)
        .unwrap_err();
    assert!(matches!(err, ScanError::DuplicateId(id) if id == "sbom"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn registry_resolve_reports_first_unknown_id() {
    let registry = supply_chain();
    let found = registry.resolve(&["vulns", "sbom"]).unwrap();
    assert_eq!(found[0].dependencies, vec!["sbom".to_string()]);

    let err = registry.resolve(&["sbom", "nope"]).unwrap_err();
    assert!(matches!(err, ScanError::UnknownId(id) if id == "nope"));
}

// ---- profile resolution ----

fn code_registry() -> AnalyzerRegistry {
    RegistryBuilder::new()
        .analyzer("code-lint", &[], Behaviour::Succeed)
        .analyzer("sbom", &[], Behaviour::Succeed)
        .analyzer("code-complexity", &[], Behaviour::Succeed)
        .analyzer("vulns", &["sbom"], Behaviour::Succeed)
        .build()
        .0
}

#[test]
fn default_selection_without_default_profile_means_everything() {
    let registry = code_registry();
    let resolved = ProfileResolver::new()
        .resolve(&AnalyzerSelection::Default, &registry)
        .unwrap();
    assert_eq!(resolved, vec!["code-lint", "sbom", "code-complexity", "vulns"]);
}

#[test]
fn profile_globs_expand_in_registry_order_and_dedupe() {
    let registry = code_registry();
    let resolver = ProfileResolver::new()
        .with_profile(Profile::new("quick", ["vulns", "code-*", "code-lint"]))
        .with_default("quick");

    let resolved = resolver
        .resolve(&AnalyzerSelection::Default, &registry)
        .unwrap();
    assert_eq!(resolved, vec!["vulns", "code-lint", "code-complexity"]);

    let plan = Scheduler::new(&registry).plan(&resolved).unwrap();
    assert_eq!(plan.wave_of("sbom"), Some(0));
    assert_eq!(plan.wave_of("vulns"), Some(1));
}

#[test]
fn profile_resolution_errors() {
    let registry = code_registry();
    let resolver = ProfileResolver::new()
        .with_profile(Profile::new("typo", ["vulnz"]))
        .with_profile(Profile::new("nothing", ["docs-*"]));

    assert!(matches!(
        resolver.resolve(&AnalyzerSelection::Profile("missing".into()), &registry),
        Err(ScanError::UnknownProfile(name)) if name == "missing"
    ));
    assert!(matches!(
        resolver.resolve(&AnalyzerSelection::Profile("typo".into()), &registry),
        Err(ScanError::UnknownId(id)) if id == "vulnz"
    ));
    assert!(matches!(
        resolver.resolve(&AnalyzerSelection::Profile("nothing".into()), &registry),
        Err(ScanError::EmptySelection)
    ));
    assert!(matches!(
        resolver.resolve(&AnalyzerSelection::Analyzers(vec![]), &registry),
        Err(ScanError::EmptySelection)
    ));
}

// ---- properties ----

/// Random acyclic registries: analyzer `i` may only depend on `0..i`.
fn dag_strategy(max: usize) -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    (1..=max).prop_flat_map(|n| {
        let deps = proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n);
        let requested = proptest::collection::vec(0..n, 1..=n);
        (deps, requested).prop_map(move |(raw, requested)| {
            let deps = raw
                .into_iter()
                .enumerate()
                .map(|(i, ds)| {
                    if i == 0 {
                        Vec::new()
                    } else {
                        ds.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect();
            (deps, requested)
        })
    })
}

/// A generated DAG plus one edge closing a cycle through `lo`; `lo` is
/// always requested so the cycle sits inside the closure.
fn cyclic_strategy(max: usize) -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    dag_strategy(max)
        .prop_flat_map(|(deps, requested)| {
            let n = deps.len();
            (Just(deps), Just(requested), 0..n, 0..n)
        })
        .prop_map(|(mut deps, mut requested, x, y)| {
            let (lo, hi) = (x.min(y), x.max(y));
            if lo < hi {
                deps[hi].push(lo);
            }
            deps[lo].push(hi);
            requested.push(lo);
            (deps, requested)
        })
}

fn registry_from(deps: &[Vec<usize>]) -> AnalyzerRegistry {
    let mut builder = RegistryBuilder::new();
    for (i, ds) in deps.iter().enumerate() {
        let names: Vec<String> = ds.iter().map(|d| format!("a{d}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        builder = builder.analyzer(&format!("a{i}"), &refs, Behaviour::Succeed);
    }
    builder.build().0
}

/// Whether `node` can reach itself by following one or more dependency edges.
fn on_cycle(deps: &[Vec<usize>], node: usize) -> bool {
    let mut seen = vec![false; deps.len()];
    let mut stack: Vec<usize> = deps[node].clone();
    while let Some(n) = stack.pop() {
        if n == node {
            return true;
        }
        if !std::mem::replace(&mut seen[n], true) {
            stack.extend(&deps[n]);
        }
    }
    false
}

proptest! {
    #[test]
    fn plans_respect_dependencies((deps, requested) in dag_strategy(12)) {
        let registry = registry_from(&deps);
        let requested: Vec<String> = requested.iter().map(|r| format!("a{r}")).collect();

        let plan = Scheduler::new(&registry).plan(&requested).unwrap();

        let mut wave_of: HashMap<String, usize> = HashMap::new();
        for wave in plan.waves() {
            prop_assert!(!wave.analyzers.is_empty());
            for id in &wave.analyzers {
                prop_assert!(wave_of.insert(id.clone(), wave.index).is_none(), "{} twice", id);
            }
        }
        for id in &requested {
            prop_assert!(wave_of.contains_key(id));
        }
        for (id, &w) in &wave_of {
            let descriptor = registry.get(id).unwrap();
            for dep in &descriptor.dependencies {
                let dw = *wave_of.get(dep).expect("dependency in plan");
                prop_assert!(dw < w, "{} (wave {}) before dep {} (wave {})", id, w, dep, dw);
            }
            // Layered: nothing sits later than it has to.
            if w > 0 {
                prop_assert!(descriptor.dependencies.iter().any(|d| wave_of[d] == w - 1));
            }
        }
    }

    #[test]
    fn cycles_are_reported_with_their_members((deps, requested) in cyclic_strategy(12)) {
        let registry = registry_from(&deps);
        let requested: Vec<String> = requested.iter().map(|r| format!("a{r}")).collect();

        match Scheduler::new(&registry).plan(&requested) {
            Err(ScanError::CycleDetected { ids }) => {
                prop_assert!(!ids.is_empty());
                for id in &ids {
                    let node: usize = id[1..].parse().unwrap();
                    prop_assert!(on_cycle(&deps, node), "{} is not on a cycle", id);
                }
            }
            other => prop_assert!(false, "expected CycleDetected, got {:?}", other),
        }
    }
}
