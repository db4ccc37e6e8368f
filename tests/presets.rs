use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use arxiv_harvester::domain::{Condition, FieldType, Operator, QueryPayload, SearchType};
use arxiv_harvester::error::HarvestError;
use arxiv_harvester::presets::{JsonPresetStore, NewPreset, PRESETS_FILE_NAME, PresetStore};

fn store(temp: &tempfile::TempDir) -> JsonPresetStore {
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    JsonPresetStore::in_dir(&dir)
}

fn simple(max_results: u32) -> QueryPayload {
    QueryPayload::Simple {
        conditions: vec![
            Condition::new(FieldType::Ti, "transformer"),
            Condition::new(FieldType::Cat, "cs.CL").with_operator(Operator::And),
        ],
        max_results,
    }
}

fn advanced(query: &str) -> QueryPayload {
    QueryPayload::Advanced {
        query: query.to_string(),
        max_results: 20,
    }
}

#[test]
fn create_and_read_back() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);

    let created = store.create(NewPreset::new(" nlp ", simple(15))).unwrap();
    assert_eq!(created.name, "nlp");
    assert_eq!(created.search_type, SearchType::Simple);
    assert!(created.updated_at.is_none());

    let found = store.find_by_name("nlp").unwrap().unwrap();
    assert_eq!(found, created);
    assert_eq!(store.get(created.id).unwrap(), created);
    assert_eq!(store.list().unwrap().len(), 1);

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp.path().join(PRESETS_FILE_NAME)).unwrap())
            .unwrap();
    assert_eq!(raw[0]["type"], "simple");
    assert_eq!(raw[0]["data"]["conditions"][0]["type"], "ti");
    assert_eq!(raw[0]["data"]["maxResults"], 15);
}

#[test]
fn duplicate_name_is_rejected_before_writing() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    store.create(NewPreset::new("agents", advanced("all:agents"))).unwrap();
    let before = fs::read(temp.path().join(PRESETS_FILE_NAME)).unwrap();

    let err = store
        .create(NewPreset::new("agents", advanced("ti:other")))
        .unwrap_err();

    assert_matches!(err, HarvestError::DuplicatePresetName(name) if name == "agents");
    assert_eq!(fs::read(temp.path().join(PRESETS_FILE_NAME)).unwrap(), before);
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn names_are_case_sensitive() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    store.create(NewPreset::new("Agents", advanced("all:agents"))).unwrap();

    let other = store.create(NewPreset::new("agents", advanced("all:agents"))).unwrap();

    assert_eq!(other.name, "agents");
    assert_eq!(store.list().unwrap().len(), 2);
}

#[test]
fn ids_stay_unique_for_fast_creates() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);

    let ids: Vec<i64> = (0..5)
        .map(|n| {
            store
                .create(NewPreset::new(format!("p{n}"), advanced("all:x")))
                .unwrap()
                .id
        })
        .collect();

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn update_replaces_payload_and_stamps_time() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    let created = store.create(NewPreset::new("nlp", simple(10))).unwrap();

    let updated = store
        .update(created.id, NewPreset::new("nlp-adv", advanced("abs:parsing")))
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name, "nlp-adv");
    assert_eq!(updated.search_type, SearchType::Advanced);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at.is_some());
    assert!(store.find_by_name("nlp").unwrap().is_none());
}

#[test]
fn update_keeps_own_name_but_not_anothers() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    let first = store.create(NewPreset::new("first", advanced("all:a"))).unwrap();
    store.create(NewPreset::new("second", advanced("all:b"))).unwrap();

    store
        .update(first.id, NewPreset::new("first", advanced("all:c")))
        .unwrap();
    let err = store
        .update(first.id, NewPreset::new("second", advanced("all:c")))
        .unwrap_err();

    assert_matches!(err, HarvestError::DuplicatePresetName(_));
}

#[test]
fn invalid_payloads_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);

    let err = store
        .create(NewPreset::new("blank", advanced("   ")))
        .unwrap_err();
    assert_matches!(err, HarvestError::EmptyQuery);

    let err = store.create(NewPreset::new("zero", simple(0))).unwrap_err();
    assert_matches!(err, HarvestError::InvalidInput(_));

    assert!(!temp.path().join(PRESETS_FILE_NAME).exists());
}

#[test]
fn delete_and_missing_ids() {
    let temp = tempfile::tempdir().unwrap();
    let store = store(&temp);
    let created = store.create(NewPreset::new("gone", advanced("all:x"))).unwrap();

    let removed = store.delete(created.id).unwrap();
    assert_eq!(removed.name, "gone");
    assert!(store.list().unwrap().is_empty());

    assert_matches!(store.delete(created.id), Err(HarvestError::PresetNotFound(_)));
    assert_matches!(store.get(created.id), Err(HarvestError::PresetNotFound(_)));
    assert_matches!(
        store.update(created.id, NewPreset::new("gone", advanced("all:x"))),
        Err(HarvestError::PresetNotFound(_))
    );
}
