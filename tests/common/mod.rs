use std::sync::Arc;

use clinical_store::schema::{FieldSpec, FieldType, ModelDefinition, Schema};

/// Install a `tracing` subscriber so `RUST_LOG=debug cargo test -- --nocapture`
/// shows the store's internal logging. Safe to call from every test; repeat
/// calls after the first are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The `progNote` model: an immutable child of `clientFile`.
pub fn prog_note_model() -> Arc<ModelDefinition> {
    let schema = Schema::new(vec![
        FieldSpec::required("type", FieldType::String),
        FieldSpec::required("status", FieldType::String),
        FieldSpec::required("notes", FieldType::String),
        FieldSpec::optional("backdate", FieldType::String),
    ]);
    Arc::new(ModelDefinition::new(
        "progNote",
        "progNotes",
        false,
        vec![],
        schema,
    ))
}

/// The `clientFile` model: mutable, indexed on `clientName.first` and
/// `clientName.last`, with `progNote` as a child collection.
pub fn client_file_model() -> Arc<ModelDefinition> {
    let schema = Schema::new(vec![
        FieldSpec::required(
            "clientName",
            FieldType::Object(vec![
                FieldSpec::required("first", FieldType::String),
                FieldSpec::optional("middle", FieldType::String),
                FieldSpec::required("last", FieldType::String),
            ]),
        ),
        FieldSpec::required("recordId", FieldType::String),
        FieldSpec::required(
            "plan",
            FieldType::Object(vec![FieldSpec::required(
                "sections",
                FieldType::Array(Box::new(FieldType::Any)),
            )]),
        ),
    ]);
    Arc::new(
        ModelDefinition::new(
            "clientFile",
            "clientFile",
            true,
            vec![
                clinical_store::schema::field_path("clientName.first"),
                clinical_store::schema::field_path("clientName.last"),
            ],
            schema,
        )
        .with_children(vec![prog_note_model()]),
    )
}
