//! Table tree construction, suffix sets and lookups.

use etl_model::{
    ErrorKind, FieldRole, FieldType, KeyType, LoadOptions, LookupRef, MetadataField,
    ProjectMetadata, RepeatingEntry, RowsType, SourceFieldKind, Table,
};
use etl_rules::{RuleCompiler, parse_rules};
use etl_schema::{LookupCompiler, SchemaBuilder, lookup_rows, lookup_table_definition};
use proptest::prelude::*;

fn longitudinal() -> ProjectMetadata {
    serde_json::from_str(
        r#"{
            "fields": [
                {"field_name": "record_id", "form_name": "enrollment", "field_type": "text"},
                {"field_name": "name", "form_name": "enrollment", "field_type": "text"},
                {"field_name": "dob", "form_name": "enrollment", "field_type": "text",
                 "validation": "date_ymd"},
                {"field_name": "sex", "form_name": "enrollment", "field_type": "radio",
                 "choices": "1, Female | 2, Male"},
                {"field_name": "tests", "form_name": "labs", "field_type": "checkbox",
                 "choices": "1, chem | 2, cbc"},
                {"field_name": "result", "form_name": "labs", "field_type": "text",
                 "validation": "number"},
                {"field_name": "ae_term", "form_name": "adverse", "field_type": "text"},
                {"field_name": "ae_grade", "form_name": "adverse", "field_type": "dropdown",
                 "choices": "G1, Mild | G2, Severe"}
            ],
            "instruments": [
                {"name": "enrollment"}, {"name": "labs"}, {"name": "adverse"}
            ],
            "events": [
                {"unique_name": "baseline"},
                {"unique_name": "visit"},
                {"unique_name": "followup"}
            ],
            "designations": [
                {"event": "baseline", "form": "enrollment"},
                {"event": "visit", "form": "labs"},
                {"event": "followup", "form": "labs"},
                {"event": "followup", "form": "adverse"}
            ],
            "repeating": [
                {"event": "visit"},
                {"event": "followup", "form": "adverse"}
            ]
        }"#,
    )
    .expect("parse metadata")
}

fn generated_schema(metadata: &ProjectMetadata) -> etl_model::Schema {
    let rules = RuleCompiler::new(metadata)
        .generate(&LoadOptions::default())
        .expect("generate rules");
    SchemaBuilder::new(metadata).build(&rules).expect("build schema")
}

fn names(table: &Table) -> Vec<&str> {
    table.field_names().collect()
}

fn build_error(metadata: &ProjectMetadata, text: &str) -> etl_model::EtlError {
    let rules = parse_rules(text).expect("parse rules");
    SchemaBuilder::new(metadata)
        .build(&rules)
        .expect_err("schema should be rejected")
}

#[test]
fn builds_keys_identifiers_and_expanded_fields() {
    let metadata = longitudinal();
    let schema = generated_schema(&metadata);
    let order: Vec<&str> = schema.tables().iter().map(|table| table.name.as_str()).collect();
    assert_eq!(
        order,
        vec!["enrollment", "labs", "labs_repeating_events", "adverse"]
    );

    let root = schema.root().expect("root");
    assert_eq!(names(root), vec!["enrollment_id", "record_id", "name", "dob", "sex"]);
    assert_eq!(root.fields[0].field_type, FieldType::AutoIncrement);
    assert_eq!(root.fields[1].role, FieldRole::RecordId);

    let labs = schema.table("labs").expect("labs");
    assert_eq!(
        names(labs),
        vec![
            "labs_id",
            "enrollment_id",
            "record_id",
            "event_name",
            "tests___1",
            "tests___2",
            "result"
        ]
    );
    let foreign_key = labs.foreign_key().expect("foreign key");
    let reference = foreign_key.references.as_ref().expect("reference");
    assert_eq!(reference.table, "enrollment");
    assert_eq!(reference.key_type, KeyType::Integer);

    let repeating = schema.table("labs_repeating_events").expect("repeating events");
    assert!(names(repeating).contains(&"repeat_instance"));
    assert!(!names(repeating).contains(&"repeat_instrument"));

    let adverse = schema.table("adverse").expect("adverse");
    assert_eq!(adverse.instrument.as_deref(), Some("adverse"));
    assert_eq!(
        names(adverse)[3..6].to_vec(),
        vec!["event_name", "repeat_instrument", "repeat_instance"]
    );
}

#[test]
fn derives_event_sets_from_designations() {
    let metadata = longitudinal();
    let schema = generated_schema(&metadata);
    let suffixes = |name: &str| schema.table(name).expect("table").suffixes.clone();
    assert!(suffixes("enrollment").is_empty());
    assert_eq!(suffixes("labs"), vec!["followup".to_string()]);
    assert_eq!(suffixes("labs_repeating_events"), vec!["visit".to_string()]);
    assert_eq!(suffixes("adverse"), vec!["followup".to_string()]);
}

#[test]
fn explicit_event_list_wins() {
    let metadata = longitudinal();
    let rules = parse_rules(
        "ROOT enrollment enrollment_id\n\
         TABLE labs enrollment labs_id EVENTS:visit;followup\n\
         FIELD result float\n",
    )
    .expect("parse");
    let schema = SchemaBuilder::new(&metadata).build(&rules).expect("build");
    assert_eq!(
        schema.table("labs").expect("labs").suffixes,
        vec!["visit".to_string(), "followup".to_string()]
    );
}

#[test]
fn checkbox_expands_to_one_column_per_choice_with_lookups() {
    let metadata = longitudinal();
    let schema = generated_schema(&metadata);
    let labs = schema.table("labs").expect("labs");
    let checkboxes: Vec<_> = labs
        .fields
        .iter()
        .filter(|field| field.field_type == FieldType::Checkbox)
        .collect();
    assert_eq!(checkboxes.len(), 2);
    assert_eq!(checkboxes[0].checkbox_choice(), Some(("tests", "1")));
    assert_eq!(checkboxes[0].source.as_deref(), Some("tests"));

    let lookup = schema.lookup();
    assert_eq!(lookup.label("labs", "tests___2", "1"), Some("cbc"));
    assert_eq!(lookup.label("enrollment", "sex", "2"), Some("Male"));
    assert_eq!(lookup.label("adverse", "ae_grade", "G1"), Some("Mild"));
    assert_eq!(lookup.len(), 6);
    assert!(!lookup.has_table("labs_missing"));
}

#[test]
fn natural_root_key_uses_the_record_identifier() {
    let metadata = longitudinal();
    let rules = parse_rules(
        "ROOT enrollment record_id\n\
         FIELD name string\n\
         TABLE labs enrollment labs_id EVENTS\n\
         FIELD result float\n",
    )
    .expect("parse");
    let schema = SchemaBuilder::new(&metadata).build(&rules).expect("build");
    let root = schema.root().expect("root");
    assert!(root.uses_natural_key());
    assert_eq!(names(root), vec!["record_id", "name"]);

    let labs = schema.table("labs").expect("labs");
    assert_eq!(names(labs), vec!["labs_id", "record_id", "event_name", "result"]);
    let reference = labs
        .foreign_key()
        .and_then(|key| key.references.as_ref())
        .expect("reference");
    assert_eq!(reference.key_type, KeyType::Text);
}

#[test]
fn suffix_tables_resolve_stems() {
    let metadata: ProjectMetadata = serde_json::from_str(
        r#"{
            "fields": [
                {"field_name": "study_id", "form_name": "visits", "field_type": "text"},
                {"field_name": "bp_sys_1", "form_name": "visits", "field_type": "text"},
                {"field_name": "bp_sys_2", "form_name": "visits", "field_type": "text"}
            ]
        }"#,
    )
    .expect("parse metadata");
    let rules = RuleCompiler::new(&metadata)
        .compile(
            "ROOT visits study_id\n\
             TABLE readings visits readings_id SUFFIXES:_1;_2\n\
             FIELD bp_sys systolic int\n",
        )
        .expect("compile");
    let schema = SchemaBuilder::new(&metadata).build(&rules).expect("build");
    let readings = schema.table("readings").expect("readings");
    assert_eq!(names(readings), vec!["readings_id", "study_id", "suffix", "systolic"]);
    assert_eq!(readings.suffixes, vec!["_1".to_string(), "_2".to_string()]);
    assert_eq!(readings.rows_type, RowsType::BySuffixes);
}

#[test]
fn rejects_broken_parent_links() {
    let metadata = longitudinal();
    let cases = [
        (
            "ROOT enrollment enrollment_id\nTABLE a a a_id EVENTS\n",
            "cyclic table reference",
        ),
        (
            "ROOT enrollment enrollment_id\nTABLE a b a_id EVENTS\nTABLE b a b_id EVENTS\n",
            "cyclic table reference",
        ),
        (
            "ROOT enrollment enrollment_id\nTABLE a ghost a_id EVENTS\n",
            "parent table `ghost` is not declared",
        ),
        (
            "ROOT enrollment enrollment_id\nTABLE a enrollment a_id EVENTS\nTABLE a enrollment b_id EVENTS\n",
            "duplicate table name",
        ),
    ];
    for (text, expected) in cases {
        let error = build_error(&metadata, text);
        assert_eq!(error.kind(), ErrorKind::Schema, "{text}");
        assert!(error.to_string().contains(expected), "{error}");
    }
}

#[test]
fn rejects_name_collisions_with_synthesized_columns() {
    let metadata = longitudinal();
    let key_clash = build_error(
        &metadata,
        "ROOT enrollment enrollment_id\nTABLE labs enrollment enrollment_id EVENTS\n",
    );
    assert_eq!(key_clash.table(), Some("labs"));
    assert!(key_clash.to_string().contains("duplicate field name"));

    let identifier_clash = build_error(
        &metadata,
        "ROOT enrollment enrollment_id\nFIELD name record_id string\n",
    );
    assert_eq!(identifier_clash.kind(), ErrorKind::Schema);
}

#[test]
fn checkbox_without_choices_is_rejected() {
    let metadata = longitudinal();
    let error = build_error(
        &metadata,
        "ROOT enrollment enrollment_id\nFIELD name flags checkbox\n",
    );
    assert_eq!(error.kind(), ErrorKind::Schema);
    assert!(error.to_string().contains("declares no choices"));
}

#[test]
fn lookup_compiler_rejects_unknown_choice_lists() {
    let metadata = longitudinal();
    let mut table = Table::new("labs", RowsType::Root);
    table.fields.push(
        etl_model::Field::data("result", "result", FieldType::String).with_lookup(LookupRef {
            source_field: "result".to_string(),
            choice: None,
        }),
    );
    let error = LookupCompiler::new(&metadata)
        .compile(&[table])
        .expect_err("result has no choices");
    assert_eq!(error.kind(), ErrorKind::Schema);
    assert_eq!(error.table(), Some("labs"));
}

#[test]
fn lookup_rows_cover_every_choice() {
    let metadata = longitudinal();
    let schema = generated_schema(&metadata);
    let definition = lookup_table_definition("lookup");
    assert_eq!(
        names(&definition),
        vec!["lookup_id", "table_name", "field_name", "value", "label"]
    );
    let rows = lookup_rows(&definition, schema.lookup());
    // sex: 2, labs tests: 2, repeating labs tests: 2, ae_grade: 2
    assert_eq!(rows.len(), 8);
    let first = &rows[0];
    assert_eq!(first.values[0], "1");
    assert_eq!(first.values[1], "adverse");
    assert_eq!(first.values[2], "ae_grade");
    assert_eq!(first.values[3], "G1");
}

fn classic_metadata(forms: &[usize], repeating: &[bool]) -> ProjectMetadata {
    let mut fields = vec![MetadataField {
        field_name: "record_id".to_string(),
        form_name: "form0".to_string(),
        field_type: SourceFieldKind::Text,
        label: String::new(),
        validation: None,
        choices: None,
    }];
    for (index, form) in forms.iter().enumerate() {
        fields.push(MetadataField {
            field_name: format!("f{index}"),
            form_name: format!("form{form}"),
            field_type: if index % 3 == 0 {
                SourceFieldKind::Radio
            } else {
                SourceFieldKind::Text
            },
            label: String::new(),
            validation: None,
            choices: Some("1, One | 2, Two".to_string()),
        });
    }
    let repeating = repeating
        .iter()
        .enumerate()
        .filter(|(_, repeats)| **repeats)
        .map(|(form, _)| RepeatingEntry {
            event: None,
            form: Some(format!("form{form}")),
        })
        .collect();
    ProjectMetadata {
        fields,
        repeating,
        ..ProjectMetadata::default()
    }
}

proptest! {
    #[test]
    fn building_is_deterministic_and_parents_come_first(
        forms in prop::collection::vec(0usize..4, 1..12),
        repeating in prop::collection::vec(any::<bool>(), 4),
    ) {
        let metadata = classic_metadata(&forms, &repeating);
        let rules = RuleCompiler::new(&metadata)
            .generate(&LoadOptions::default())
            .expect("generate rules");
        let first = SchemaBuilder::new(&metadata).build(&rules).expect("build");
        let second = SchemaBuilder::new(&metadata).build(&rules).expect("rebuild");
        prop_assert_eq!(&first, &second);

        for (index, table) in first.tables().iter().enumerate() {
            prop_assert_eq!(
                table.fields.iter().filter(|field| field.is_primary_key()).count(),
                1
            );
            if let Some(parent) = table.parent.as_deref() {
                let parent_index = first.table_index(parent).expect("parent exists");
                prop_assert!(parent_index < index);
            }
        }
    }
}
