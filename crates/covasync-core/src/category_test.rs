use std::path::Path;

use super::*;

fn sample_map() -> CategoryMap {
    let mut mappings = BTreeMap::new();
    mappings.insert("Edibles".to_string(), 21);
    mappings.insert("Pre-Rolls".to_string(), 22);
    CategoryMap {
        default_category: Some(15),
        mappings,
    }
}

#[test]
fn resolve_exact_match() {
    assert_eq!(
        sample_map().resolve(Some("Edibles")),
        CategoryAssignment::Mapped(21)
    );
}

#[test]
fn resolve_is_case_insensitive_as_fallback() {
    assert_eq!(
        sample_map().resolve(Some("pre-rolls")),
        CategoryAssignment::Mapped(22)
    );
}

#[test]
fn resolve_unknown_uses_default() {
    assert_eq!(
        sample_map().resolve(Some("Topicals")),
        CategoryAssignment::Default(15)
    );
    assert_eq!(sample_map().resolve(None), CategoryAssignment::Default(15));
    assert_eq!(sample_map().resolve(Some("  ")), CategoryAssignment::Default(15));
}

#[test]
fn resolve_without_default_is_unassigned() {
    let map = CategoryMap::default();
    assert_eq!(map.resolve(Some("Edibles")), CategoryAssignment::Unassigned);
    assert_eq!(map.resolve(Some("Edibles")).id(), None);
}

#[test]
fn parses_yaml_document() {
    let yaml = "default_category: 9\nmappings:\n  Flower: 31\n  Vapes: 32\n";
    let map: CategoryMap = serde_yaml::from_str(yaml).expect("yaml should parse");
    validate_category_map(&map).expect("map should validate");
    assert_eq!(map.default_category, Some(9));
    assert_eq!(map.mappings.get("Vapes"), Some(&32));
}

#[test]
fn empty_yaml_sections_default() {
    let map: CategoryMap = serde_yaml::from_str("mappings: {}\n").expect("yaml should parse");
    assert_eq!(map, CategoryMap::default());
}

#[test]
fn validate_rejects_non_positive_ids() {
    let mut map = sample_map();
    map.mappings.insert("Topicals".to_string(), 0);
    let err = validate_category_map(&map).unwrap_err();
    assert!(err.to_string().contains("invalid id 0"));
}

#[test]
fn validate_rejects_case_duplicates() {
    let mut map = sample_map();
    map.mappings.insert("EDIBLES".to_string(), 40);
    let err = validate_category_map(&map).unwrap_err();
    assert!(err.to_string().contains("duplicate category name"));
}

#[test]
fn validate_rejects_bad_default() {
    let map = CategoryMap {
        default_category: Some(-1),
        mappings: BTreeMap::new(),
    };
    assert!(validate_category_map(&map).is_err());
}

#[test]
fn load_missing_file_yields_empty_map() {
    let map = load_category_map(Path::new("/nonexistent/covasync/categories.yaml"))
        .expect("missing file is not an error");
    assert_eq!(map, CategoryMap::default());
}

#[test]
fn load_reads_file_from_disk() {
    let path = std::env::temp_dir().join(format!(
        "covasync-categories-{}.yaml",
        std::process::id()
    ));
    std::fs::write(&path, "default_category: 3\nmappings:\n  Edibles: 4\n").expect("write");
    let map = load_category_map(&path).expect("load");
    std::fs::remove_file(&path).ok();
    assert_eq!(map.resolve(Some("Edibles")), CategoryAssignment::Mapped(4));
}

#[test]
fn load_rejects_malformed_yaml() {
    let path = std::env::temp_dir().join(format!(
        "covasync-categories-bad-{}.yaml",
        std::process::id()
    ));
    std::fs::write(&path, "mappings: [not, a, map]\n").expect("write");
    let result = load_category_map(&path);
    std::fs::remove_file(&path).ok();
    assert!(matches!(result, Err(ConfigError::CategoryFileParse(_))));
}
