use serde_json::{Value, json};

use docshell::{
    command::{Command, CommandOutput},
    error::DocumentStoreError,
    memory::IdKind,
    session::{RunOptions, RunSummary, Session, ShellError},
};

const LIBRARY: &str = include_str!("../../demos/library.jsonl");
const ECOMMERCE: &str = include_str!("../../demos/ecommerce.jsonl");

async fn run_script(session: &mut Session, script: &str, options: RunOptions) -> (Result<RunSummary, ShellError>, Vec<Value>, Vec<Value>) {
    let mut out = Vec::new();
    let mut errors = Vec::new();

    let result = session.run(script.as_bytes(), &mut out, &mut errors, options).await;

    let parse = |bytes: Vec<u8>| {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap())
            .collect::<Vec<_>>()
    };

    (result, parse(out), parse(errors))
}

#[tokio::test]
async fn replays_the_library_session() {
    let mut session = Session::default();
    let (result, out, errors) = run_script(&mut session, LIBRARY, RunOptions::default()).await;

    assert_eq!(result.unwrap(), RunSummary { executed: 14, failed: 0 });
    assert!(errors.is_empty());
    assert_eq!(session.database(), "library");

    assert_eq!(out[0], json!("switched to db library"));
    assert_eq!(out[1], json!({ "ok": 1 }));
    assert_eq!(out[2]["insertedIds"].as_array().unwrap().len(), 5);
    assert_eq!(out[2]["insertedIds"][0], json!({ "$oid": "67a74fcb2e6f3ba1884d7942" }));

    assert_eq!(out[3].as_array().unwrap().len(), 5);
    assert_eq!(out[4][0]["title"], json!("Dolls House"));
    assert_eq!(out[5].as_array().unwrap().len(), 1);
    assert_eq!(out[5][0]["title"], json!("The 5th wave"));

    assert_eq!(out[6], json!({ "acknowledged": true, "matchedCount": 1, "modifiedCount": 1 }));
    assert_eq!(out[7], json!({ "acknowledged": true, "matchedCount": 5, "modifiedCount": 5 }));
    assert_eq!(out[8], json!({ "acknowledged": true, "deletedCount": 1 }));
    assert_eq!(out[9], json!({ "acknowledged": true, "deletedCount": 1 }));

    assert_eq!(
        out[10],
        json!([
            { "_id": "action", "totalBooks": 1 },
            { "_id": "Science Fiction", "totalBooks": 1 },
            { "_id": "Marriage", "totalBooks": 1 },
        ])
    );
    assert_eq!(out[11], json!([{ "_id": null, "averagePublishedYear": 1946.0 }]));
    assert_eq!(out[12][0]["title"], json!("The well"));
    assert_eq!(out[13], json!("author_1"));

    let listed = session
        .execute_line(r#"{"op": "listIndexes", "collection": "books"}"#)
        .await
        .unwrap();
    assert_eq!(listed.to_json(), json!([{ "name": "author_1", "key": { "author": 1 } }]));
}

#[tokio::test]
async fn replays_the_ecommerce_session_past_its_typo() {
    let mut session = Session::default();
    let (result, out, errors) = run_script(&mut session, ECOMMERCE, RunOptions::default()).await;

    assert_eq!(result.unwrap(), RunSummary { executed: 11, failed: 1 });
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["error"], json!("InvalidCommand"));

    assert_eq!(out[6], json!(["orders", "products", "users"]));
    assert_eq!(out[7], json!(0));

    let orders = out[8].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["orderId"], json!(2));
    assert_eq!(orders[1]["orderDate"], json!({ "$date": "2025-05-02T00:00:00.000Z" }));

    assert_eq!(
        out[9],
        json!([
            { "_id": "Shipped", "orders": 1, "firstOrder": { "$date": "2025-05-02T00:00:00.000Z" } },
            { "_id": "Processing", "orders": 1, "firstOrder": { "$date": "2025-06-02T00:00:00.000Z" } },
        ])
    );
}

#[tokio::test]
async fn fail_fast_stops_at_the_first_error() {
    let mut session = Session::default();
    let script = [
        r#"{"op": "createCollection", "collection": "books"}"#,
        r#"{"op": "createCollection", "collection": "books"}"#,
        r#"{"op": "insertOne", "collection": "books", "document": {"title": "never"}}"#,
    ]
    .join("\n");

    let options = RunOptions { fail_fast: true, pretty: false };
    let (result, out, errors) = run_script(&mut session, &script, options).await;

    match result {
        Err(ShellError::Aborted { line, source }) => {
            assert_eq!(line, 2);
            assert_eq!(source, DocumentStoreError::AlreadyExists("books".to_string()));
        }
        other => panic!("expected an aborted run, got {other:?}"),
    }
    assert_eq!(out, vec![json!({ "ok": 1 })]);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["line"], json!(2));
    assert_eq!(errors[0]["error"], json!("AlreadyExists"));

    let count = session
        .execute_line(r#"{"op": "countDocuments", "collection": "books"}"#)
        .await
        .unwrap();
    assert_eq!(count, CommandOutput::Count(0));
}

#[tokio::test]
async fn databases_are_independent() {
    let mut session = Session::new(IdKind::Uuid);

    session
        .execute_line(r#"{"op": "insertOne", "collection": "notes", "document": {"text": "in test"}}"#)
        .await
        .unwrap();
    session
        .execute(Command::Use { database: "library".to_string() })
        .await
        .unwrap();

    let found = session
        .execute_line(r#"{"op": "find", "collection": "notes"}"#)
        .await
        .unwrap();
    assert_eq!(found, CommandOutput::Documents(Vec::new()));

    session
        .execute(Command::Use { database: "test".to_string() })
        .await
        .unwrap();
    let note = session
        .execute_line(r#"{"op": "findOne", "collection": "notes", "filter": {"text": "in test"}}"#)
        .await
        .unwrap()
        .to_json();
    assert!(note["_id"].is_string());
    assert_eq!(session.databases(), ["library", "test"]);
}

#[tokio::test]
async fn malformed_arguments_are_reported_by_kind() {
    let mut session = Session::default();
    session
        .execute_line(r#"{"op": "insertOne", "collection": "books", "document": {"_id": 1, "title": "The hobbit"}}"#)
        .await
        .unwrap();

    let cases = [
        (r#"{"op": "find", "collection": "books", "filter": {"title": {"$regex": "hob"}}}"#, "InvalidFilter"),
        (r#"{"op": "updateOne", "collection": "books", "filter": {}, "update": {"title": "x"}}"#, "InvalidUpdate"),
        (r#"{"op": "aggregate", "collection": "books", "pipeline": [{"$out": "copy"}]}"#, "UnsupportedStage"),
        (r#"{"op": "aggregate", "collection": "books", "pipeline": [{"$limit": 0}]}"#, "InvalidPipeline"),
        (r#"{"op": "insertOne", "collection": "books", "document": {"_id": 1}}"#, "DuplicateKey"),
        (r#"{"op": "dropIndex", "collection": "books", "name": "author_1"}"#, "NotFound"),
        (r#"{"op": "insertOne", "collection": "books", "document": {"_id": {"$oid": "zz"}}}"#, "Serialization"),
        (r#"{"op": "createIndex", "collection": "books", "keys": {"author": "text"}}"#, "InvalidCommand"),
    ];

    for (line, kind) in cases {
        let err = session.execute_line(line).await.unwrap_err();
        assert_eq!(err.kind(), kind, "{line}");
    }
}
