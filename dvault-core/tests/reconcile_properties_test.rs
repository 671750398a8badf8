//! Reconciliation and aggregation properties over whole passes

use dvault_core::names::jcr;
use dvault_core::{
    AccessControlHandling, Artifact, ArtifactSet, AggregatorManager, DefaultWorkspaceFilter,
    ExportConfig, ImportEntry, ImportOptions, Importer, MemorySession, Modification, PropertyType,
    RecordingListener, Session, codec,
};
use proptest::prelude::*;
use std::collections::HashSet;

struct Entry {
    parent: String,
    name: String,
    artifacts: ArtifactSet,
}

impl ImportEntry for Entry {
    fn parent(&self) -> &str {
        &self.parent
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }
}

fn folder_entry(hints: &[&str]) -> Entry {
    let mut artifacts = ArtifactSet::new();
    artifacts.add(Artifact::directory("folder")).unwrap();
    for hint in hints {
        artifacts.add(Artifact::hint(&format!("folder/{}", hint))).unwrap();
    }
    Entry {
        parent: "/content".to_string(),
        name: "folder".to_string(),
        artifacts,
    }
}

fn repository(children: &[(&str, &str)]) -> MemorySession {
    let mut s = MemorySession::new();
    s.add_node("/", "content", jcr::NT_FOLDER).unwrap();
    s.add_node("/content", "folder", jcr::NT_FOLDER).unwrap();
    for (name, node_type) in children {
        s.add_node("/content/folder", name, node_type).unwrap();
    }
    s.save().unwrap();
    s
}

fn children(s: &MemorySession) -> Vec<String> {
    s.require_node("/content/folder")
        .unwrap()
        .children
        .iter()
        .map(|c| c.name.clone())
        .collect()
}

fn run(s: &mut MemorySession, options: &ImportOptions, entry: Entry) -> dvault_core::ImportInfo {
    let filter = DefaultWorkspaceFilter::for_root("/content");
    let mut listener = RecordingListener::default();
    Importer::from_options(options)
        .run(s, &filter, &[entry], &mut listener)
        .unwrap()
}

#[test]
fn test_replace_deletes_unlisted_child() {
    let mut s = repository(&[("a", jcr::NT_FOLDER), ("b", jcr::NT_FOLDER), ("c", jcr::NT_FOLDER)]);
    let info = run(&mut s, &ImportOptions::default(), folder_entry(&["a", "b"]));
    assert_eq!(children(&s), vec!["a", "b"]);
    assert_eq!(info.get("/content/folder/c"), Some(Modification::Deleted));
    assert!(info.get("/content/folder/a").is_none());
}

#[test]
fn test_ignored_acl_child_is_kept() {
    let mut s = repository(&[("a", jcr::NT_FOLDER), ("b", jcr::NT_FOLDER), ("c", jcr::REP_ACL)]);
    let options = ImportOptions {
        ac_handling: AccessControlHandling::Ignore,
        ..Default::default()
    };
    let info = run(&mut s, &options, folder_entry(&["a", "b"]));
    assert_eq!(children(&s), vec!["a", "b", "c"]);
    assert!(info.is_empty());
}

#[test]
fn test_reconcile_twice_is_idempotent() {
    let mut s = repository(&[("a", jcr::NT_FOLDER), ("c", jcr::NT_FOLDER)]);
    run(&mut s, &ImportOptions::default(), folder_entry(&["a"]));
    let second = run(&mut s, &ImportOptions::default(), folder_entry(&["a"]));
    assert!(second.is_empty());
}

#[test]
fn test_listener_receives_changes() {
    let mut s = repository(&[("c", jcr::NT_FOLDER)]);
    let filter = DefaultWorkspaceFilter::for_root("/content");
    let mut listener = RecordingListener::default();
    Importer::from_options(&ImportOptions::default())
        .run(&mut s, &filter, &[folder_entry(&[])], &mut listener)
        .unwrap();
    assert_eq!(
        listener.messages,
        vec![("D".to_string(), "/content/folder/c".to_string())]
    );
}

#[test]
fn test_reference_list_keeps_order() {
    let property = codec::parse(jcr::PREDECESSORS, "{Reference}[id1,id2]").unwrap();
    assert_eq!(property.property_type(), PropertyType::Reference);
    assert!(property.is_multi());
    assert_eq!(property.value_strings(), vec!["id1", "id2"]);
}

#[derive(Debug, Clone)]
struct Shape {
    node_type: &'static str,
    children: Vec<Shape>,
}

fn shape() -> impl Strategy<Value = Shape> {
    let types = prop_oneof![
        Just(jcr::NT_FOLDER),
        Just(jcr::NT_UNSTRUCTURED),
        Just("nt:file"),
        Just(jcr::REP_ACL),
    ];
    let leaf = types.clone().prop_map(|node_type| Shape {
        node_type,
        children: Vec::new(),
    });
    leaf.prop_recursive(4, 40, 4, move |inner| {
        (types.clone(), proptest::collection::vec(inner, 0..4))
            .prop_map(|(node_type, children)| Shape { node_type, children })
    })
}

fn build(s: &mut MemorySession, parent: &str, shape: &Shape) {
    for (i, child) in shape.children.iter().enumerate() {
        let path = s.add_node(parent, &format!("n{}", i), child.node_type).unwrap();
        build(s, &path, child);
    }
}

proptest! {
    #[test]
    fn test_sibling_aggregates_never_share_nodes(tree in shape()) {
        let mut s = MemorySession::new();
        s.add_node("/", "content", jcr::NT_FOLDER).unwrap();
        build(&mut s, "/content", &tree);

        let manager = AggregatorManager::from_config(&ExportConfig::default());
        let aggregates = manager.collect(&s, "/content").unwrap();
        let mut claimed = HashSet::new();
        for aggregate in &aggregates {
            for path in aggregate.included_paths(&s).unwrap() {
                prop_assert!(claimed.insert(path.clone()), "{} claimed twice", path);
            }
        }
        let hinted: HashSet<String> = aggregates
            .iter()
            .flat_map(|a| a.hints().iter().cloned())
            .collect();
        prop_assert!(claimed.is_disjoint(&hinted));
    }
}
