use csv::ReaderBuilder;
use rollcall::{
    archive::{ArchiveOptions, ArchiveState, ArchiveWorkflow},
    config::Settings,
    export::{ExportCenter, ExportMode},
    history::{ArchiveLog, HistoryListener},
    month::MonthTable,
    store::{DeleteFault, MemoryStore, Row, StoreError},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::tempdir;

fn row(v: Value) -> Row {
    v.as_object().cloned().unwrap()
}

fn members(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            row(json!({
                "id": i,
                "Full Name": format!("Member {:03}", i),
                "Gender": if i % 2 == 0 { "M" } else { "female" },
                "Phone Number": "8031234567",
                "Age": 10 + (i % 30),
                "attendance_2025_12_07": if i % 3 == 0 { "Present" } else { "Absent" },
            }))
        })
        .collect()
}

#[tokio::test]
async fn archive_multi_page_table_end_to_end() {
    let store = Arc::new(MemoryStore::new().with_table("december_2025", members(25)));
    let dir = tempdir().unwrap();
    let listener = Arc::new(HistoryListener::new(
        ArchiveLog::new(dir.path().join("history")).unwrap(),
    ));
    let options = ArchiveOptions {
        page_size: 10,
        ..ArchiveOptions::default()
    };
    let table: MonthTable = "december_2025".parse().unwrap();

    let mut wf = ArchiveWorkflow::open(store.clone(), table, options, listener.clone())
        .await
        .unwrap();
    // 10 + 10 + 5, then an empty page
    assert_eq!(store.calls().range_selects, 4);
    assert_eq!(wf.session().stats().total, 25);
    assert_eq!(wf.session().stats().males, 13);

    let path = wf.download(&dir.path().join("exports")).unwrap();
    let body = std::fs::read_to_string(&path).unwrap();
    let (summary, table_part) = body.split_once("\n\n").unwrap();
    assert!(summary.contains("Total Members: 25"));

    let records: Vec<csv::StringRecord> = ReaderBuilder::new()
        .from_reader(table_part.as_bytes())
        .records()
        .map(Result::unwrap)
        .collect();
    assert_eq!(records.len(), 25);
    assert_eq!(&records[0][0], "Member 000");
    assert_eq!(&records[0][1], "Male");
    assert_eq!(&records[0][2], "=\"08031234567\"");

    // a refused delete leaves everything in place
    store.fail_next_delete(DeleteFault::Refuse(StoreError::Rejected {
        status: 500,
        message: "internal".into(),
    }));
    wf.request_delete().unwrap();
    assert!(wf.confirm_delete().await.is_err());
    assert_eq!(wf.state(), ArchiveState::Confirm);
    assert!(store.contains("december_2025"));

    let outcome = wf.confirm_delete().await.unwrap();
    assert_eq!(wf.state(), ArchiveState::Done);
    assert!(!store.contains("december_2025"));
    assert_eq!(outcome.csv_path.as_deref(), Some(path.as_path()));

    let entries = listener.log().load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].table, "december_2025");
    assert_eq!(entries[0].rows, 25);
}

#[tokio::test]
async fn archive_reads_whole_table_when_store_caps_rows() {
    let store = Arc::new(MemoryStore::new().with_table("december_2025", members(2500)));
    store.cap_rows_per_read(1000);
    let options = ArchiveOptions {
        page_size: 5000,
        ..ArchiveOptions::default()
    };
    let table: MonthTable = "december_2025".parse().unwrap();

    let mut wf = ArchiveWorkflow::open(
        store.clone(),
        table,
        options,
        Arc::new(rollcall::archive::LogListener),
    )
    .await
    .unwrap();
    assert_eq!(wf.session().rows().len(), 2500);
    assert_eq!(wf.csv().unwrap().rows, 2500);

    wf.request_delete().unwrap();
    let outcome = wf.confirm_delete().await.unwrap();
    assert_eq!(outcome.rows, 2500);
    assert!(!store.contains("december_2025"));
}

#[tokio::test]
async fn export_across_months_then_save() {
    let store = Arc::new(
        MemoryStore::new()
            .with_table("november_2025", members(3))
            .with_table("december_2025", members(2)),
    );
    let dir = tempdir().unwrap();
    let mut center = ExportCenter::new(store, &Settings::default());
    center.select("november_2025".parse().unwrap());
    center.select("december_2025".parse().unwrap());
    center.set_columns(vec!["Full Name".into()]);

    let doc = center.export(ExportMode::Standard).await.unwrap();
    let path = doc.save(dir.path()).unwrap();
    assert_eq!(
        path.file_name().unwrap(),
        "export_november_2025_december_2025.csv"
    );
    let body = std::fs::read_to_string(path).unwrap();
    assert_eq!(body.lines().count(), 6);
    assert!(body.ends_with("\"Member 001\",\"december_2025\"\n"));
}
