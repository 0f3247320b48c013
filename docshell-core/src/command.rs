//! Shell command surface.
//!
//! Every shell invocation is one JSON object tagged by `"op"`:
//!
//! ```json
//! {"op": "insertOne", "collection": "books", "document": {"title": "The hobbit"}}
//! {"op": "find", "collection": "books", "filter": {"publishedYear": {"$gt": 2000}}}
//! {"op": "aggregate", "collection": "books", "pipeline": [{"$group": {"_id": "$genre", "totalBooks": {"$sum": 1}}}]}
//! ```
//!
//! [`Command::execute`] runs a command against one [`DocumentStore`]. `use` is
//! not a store operation; it is resolved by whoever owns the set of databases.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
    index::IndexModel,
    json::{bson_to_json, document_from_json, document_to_json},
    query::{Expr, Query, Sort},
    result::{DeleteResult, UpdateResult},
    store::DocumentStore,
};

/// One shell command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// `use <database>`
    Use { database: String },
    CreateCollection { collection: String },
    DropCollection { collection: String },
    ListCollections,
    InsertOne { collection: String, document: Value },
    InsertMany { collection: String, documents: Vec<Value> },
    /// `db.<collection>.find(filter).sort(sort).skip(skip).limit(limit)`
    Find {
        collection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skip: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    FindOne {
        collection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Value>,
    },
    CountDocuments {
        collection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Value>,
    },
    UpdateOne { collection: String, filter: Value, update: Value },
    UpdateMany { collection: String, filter: Value, update: Value },
    DeleteOne { collection: String, filter: Value },
    DeleteMany { collection: String, filter: Value },
    Aggregate { collection: String, pipeline: Vec<Value> },
    /// `db.<collection>.createIndex(keys)`
    CreateIndex { collection: String, keys: Value },
    ListIndexes { collection: String },
    DropIndex { collection: String, name: String },
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Plain acknowledgement.
    Ok,
    InsertedOne(Bson),
    Inserted(Vec<Bson>),
    Documents(Vec<Document>),
    Document(Option<Document>),
    Count(u64),
    Updated(UpdateResult),
    Deleted(DeleteResult),
    IndexName(String),
    Indexes(Vec<IndexModel>),
    Names(Vec<String>),
    /// The database now targeted by the session.
    Switched(String),
}

impl CommandOutput {
    /// Renders the output the way the interactive shell prints it.
    pub fn to_json(&self) -> Value {
        match self {
            CommandOutput::Ok => json!({ "ok": 1 }),
            CommandOutput::InsertedOne(id) => json!({
                "acknowledged": true,
                "insertedId": bson_to_json(id),
            }),
            CommandOutput::Inserted(ids) => json!({
                "acknowledged": true,
                "insertedIds": ids.iter().map(bson_to_json).collect::<Vec<_>>(),
            }),
            CommandOutput::Documents(documents) => {
                Value::Array(documents.iter().map(document_to_json).collect())
            }
            CommandOutput::Document(document) => {
                document.as_ref().map(document_to_json).unwrap_or(Value::Null)
            }
            CommandOutput::Count(count) => json!(count),
            CommandOutput::Updated(result) => json!({
                "acknowledged": true,
                "matchedCount": result.matched_count,
                "modifiedCount": result.modified_count,
            }),
            CommandOutput::Deleted(result) => json!({
                "acknowledged": true,
                "deletedCount": result.deleted_count,
            }),
            CommandOutput::IndexName(name) => json!(name),
            CommandOutput::Indexes(indexes) => Value::Array(
                indexes
                    .iter()
                    .map(|index| json!({ "name": index.name, "key": document_to_json(&index.keys()) }))
                    .collect(),
            ),
            CommandOutput::Names(names) => json!(names),
            CommandOutput::Switched(database) => json!(format!("switched to db {database}")),
        }
    }
}

impl Command {
    /// Parses a single JSON command line.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCommand`] for unknown `op` tags or
    /// missing arguments.
    pub fn from_json(line: &str) -> DocumentStoreResult<Self> {
        serde_json::from_str(line).map_err(|err| DocumentStoreError::InvalidCommand(err.to_string()))
    }

    /// The shell name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Use { .. } => "use",
            Command::CreateCollection { .. } => "createCollection",
            Command::DropCollection { .. } => "dropCollection",
            Command::ListCollections => "listCollections",
            Command::InsertOne { .. } => "insertOne",
            Command::InsertMany { .. } => "insertMany",
            Command::Find { .. } => "find",
            Command::FindOne { .. } => "findOne",
            Command::CountDocuments { .. } => "countDocuments",
            Command::UpdateOne { .. } => "updateOne",
            Command::UpdateMany { .. } => "updateMany",
            Command::DeleteOne { .. } => "deleteOne",
            Command::DeleteMany { .. } => "deleteMany",
            Command::Aggregate { .. } => "aggregate",
            Command::CreateIndex { .. } => "createIndex",
            Command::ListIndexes { .. } => "listIndexes",
            Command::DropIndex { .. } => "dropIndex",
        }
    }

    /// Runs the command against `store`.
    ///
    /// # Errors
    ///
    /// Any error of the underlying operation, or
    /// [`DocumentStoreError::InvalidCommand`] for `use`, which needs a session.
    pub async fn execute<B: StoreBackend>(self, store: &DocumentStore<B>) -> DocumentStoreResult<CommandOutput> {
        Ok(match self {
            Command::Use { database } => {
                return Err(DocumentStoreError::InvalidCommand(format!(
                    "cannot switch to '{database}' without a session"
                )));
            }
            Command::CreateCollection { collection } => {
                store.create_collection(&collection).await?;
                CommandOutput::Ok
            }
            Command::DropCollection { collection } => {
                store.drop_collection(&collection).await?;
                CommandOutput::Ok
            }
            Command::ListCollections => CommandOutput::Names(store.list_collections().await?),
            Command::InsertOne { collection, document } => {
                let result = store
                    .collection(&collection)
                    .insert_one(document_from_json(document)?)
                    .await?;
                CommandOutput::InsertedOne(result.inserted_id)
            }
            Command::InsertMany { collection, documents } => {
                let documents = documents
                    .into_iter()
                    .map(document_from_json)
                    .collect::<DocumentStoreResult<Vec<_>>>()?;
                let result = store.collection(&collection).insert_many(documents).await?;
                CommandOutput::Inserted(result.inserted_ids)
            }
            Command::Find { collection, filter, sort, skip, limit } => {
                let mut query = Query::filtered(Expr::parse(&optional_document(filter)?)?);
                if let Some(sort) = sort {
                    query.sort = Sort::parse_spec(&document_from_json(sort)?)?;
                }
                query.skip = skip;
                query.limit = limit;

                let cursor = store.collection(&collection).query(query).await?;
                CommandOutput::Documents(cursor.collect())
            }
            Command::FindOne { collection, filter } => CommandOutput::Document(
                store
                    .collection(&collection)
                    .find_one(optional_document(filter)?)
                    .await?,
            ),
            Command::CountDocuments { collection, filter } => CommandOutput::Count(
                store
                    .collection(&collection)
                    .count_documents(optional_document(filter)?)
                    .await?,
            ),
            Command::UpdateOne { collection, filter, update } => CommandOutput::Updated(
                store
                    .collection(&collection)
                    .update_one(document_from_json(filter)?, document_from_json(update)?)
                    .await?,
            ),
            Command::UpdateMany { collection, filter, update } => CommandOutput::Updated(
                store
                    .collection(&collection)
                    .update_many(document_from_json(filter)?, document_from_json(update)?)
                    .await?,
            ),
            Command::DeleteOne { collection, filter } => CommandOutput::Deleted(
                store
                    .collection(&collection)
                    .delete_one(document_from_json(filter)?)
                    .await?,
            ),
            Command::DeleteMany { collection, filter } => CommandOutput::Deleted(
                store
                    .collection(&collection)
                    .delete_many(document_from_json(filter)?)
                    .await?,
            ),
            Command::Aggregate { collection, pipeline } => {
                let stages = pipeline
                    .into_iter()
                    .map(document_from_json)
                    .collect::<DocumentStoreResult<Vec<_>>>()?;
                CommandOutput::Documents(store.collection(&collection).aggregate(&stages).await?)
            }
            Command::CreateIndex { collection, keys } => {
                let index = IndexModel::from_keys(&document_from_json(keys)?)?;
                CommandOutput::IndexName(
                    store
                        .collection(&collection)
                        .create_index(&index.field, index.direction)
                        .await?,
                )
            }
            Command::ListIndexes { collection } => {
                CommandOutput::Indexes(store.collection(&collection).list_indexes().await?)
            }
            Command::DropIndex { collection, name } => {
                store.collection(&collection).drop_index(&name).await?;
                CommandOutput::Ok
            }
        })
    }
}

fn optional_document(value: Option<Value>) -> DocumentStoreResult<Document> {
    match value {
        None | Some(Value::Null) => Ok(Document::new()),
        Some(value) => document_from_json(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_commands() {
        let command = Command::from_json(
            r#"{"op": "updateOne", "collection": "books", "filter": {"title": "Dolls House"}, "update": {"$set": {"publishedYear": 1879}}}"#,
        )
        .unwrap();

        assert_eq!(command.name(), "updateOne");
        assert_eq!(
            command,
            Command::UpdateOne {
                collection: "books".to_string(),
                filter: json!({ "title": "Dolls House" }),
                update: json!({ "$set": { "publishedYear": 1879 } }),
            }
        );
    }

    #[test]
    fn optional_arguments_default_to_empty() {
        let command = Command::from_json(r#"{"op": "find", "collection": "books"}"#).unwrap();

        assert_eq!(
            command,
            Command::Find { collection: "books".to_string(), filter: None, sort: None, skip: None, limit: None }
        );
        assert_eq!(
            Command::from_json(r#"{"op": "listCollections"}"#).unwrap(),
            Command::ListCollections
        );
    }

    #[test]
    fn unknown_ops_and_missing_arguments_are_rejected() {
        for line in [
            r#"{"op": "insetMany", "collection": "users", "documents": []}"#,
            r#"{"op": "insertOne", "collection": "books"}"#,
            r#"{"collection": "books"}"#,
            "db.books.find()",
        ] {
            let err = Command::from_json(line).unwrap_err();
            assert_eq!(err.kind(), "InvalidCommand", "{line}");
        }
    }

    #[test]
    fn outputs_render_like_the_shell() {
        let updated = CommandOutput::Updated(UpdateResult { matched_count: 5, modified_count: 5 });
        assert_eq!(
            updated.to_json(),
            json!({ "acknowledged": true, "matchedCount": 5, "modifiedCount": 5 })
        );

        let index = IndexModel::from_keys(&bson::doc! { "author": 1 }).unwrap();
        assert_eq!(
            CommandOutput::Indexes(vec![index]).to_json(),
            json!([{ "name": "author_1", "key": { "author": 1 } }])
        );
        assert_eq!(CommandOutput::Document(None).to_json(), Value::Null);
        assert_eq!(
            CommandOutput::Switched("library".to_string()).to_json(),
            json!("switched to db library")
        );
    }
}
