use crate::{
    domain::{CommentRepository, ProfileRepository, SnapRepository},
    errors::RepoError,
    models::{coerce_coord_str, CommentRecord, ProfileRecord, SnapRecord},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoDbClient};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{self, info};

/// The posts table; the realtime feed is scoped to this name.
pub const SNAPS_TABLE: &str = "snaps";
pub const COMMENTS_TABLE: &str = "comments";
pub const PROFILES_TABLE: &str = "profiles";

type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Clone)]
pub struct DynamoDbSnapRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbSnapRepository {
    pub fn new(client: DynamoDbClient) -> Self {
        info!(table_name = SNAPS_TABLE, "Initializing DynamoDbSnapRepository");
        Self { client, table_name: SNAPS_TABLE.to_string() }
    }
}

#[async_trait]
impl SnapRepository for DynamoDbSnapRepository {
    /// Stores a snap using PutItem. Coordinates are written as numeric
    /// attributes; the insert path guarantees they are present.
    async fn insert(&self, snap: &SnapRecord) -> Result<(), RepoError> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("id", AttributeValue::S(snap.id.clone()))
            .item("author_id", AttributeValue::S(snap.author_id.clone()))
            .item("image_path", AttributeValue::S(snap.image_path.clone()))
            .item("description", AttributeValue::S(snap.description.clone()))
            .item("created_at", AttributeValue::S(snap.created_at.to_rfc3339()));
        if let Some(lat) = snap.lat {
            request = request.item("lat", AttributeValue::N(lat.to_string()));
        }
        if let Some(lng) = snap.lng {
            request = request.item("lng", AttributeValue::N(lng.to_string()));
        }
        request
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to put snap (id: {})",
                self.table_name, snap.id
            ))
            .map_err(RepoError::Backend)?;
        Ok(())
    }

    /// Lists all snaps via a paginated Scan, newest first. Scans return no
    /// ordering, so the sort happens here after the last page.
    async fn list_all(&self) -> Result<Vec<SnapRecord>, RepoError> {
        let items = scan_all(&self.client, &self.table_name).await?;
        let mut snaps = Vec::with_capacity(items.len());
        for item in items {
            match item_to_snap(&item) {
                Some(snap) => snaps.push(snap),
                None => {
                    let item_id = item.get("id").and_then(|v| v.as_s().ok());
                    tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into SnapRecord");
                    return Err(RepoError::DataCorruption {
                        table: SNAPS_TABLE,
                        detail: format!("unparseable item {item_id:?}"),
                    });
                }
            }
        }
        snaps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tracing::info!("DynamoDB (table: {}): Listed {} snaps", self.table_name, snaps.len());
        Ok(snaps)
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbCommentRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbCommentRepository {
    pub fn new(client: DynamoDbClient) -> Self {
        info!(table_name = COMMENTS_TABLE, "Initializing DynamoDbCommentRepository");
        Self { client, table_name: COMMENTS_TABLE.to_string() }
    }
}

#[async_trait]
impl CommentRepository for DynamoDbCommentRepository {
    async fn insert(&self, comment: &CommentRecord) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("id", AttributeValue::S(comment.id.clone()))
            .item("snap_id", AttributeValue::S(comment.snap_id.clone()))
            .item("author_id", AttributeValue::S(comment.author_id.clone()))
            .item("text", AttributeValue::S(comment.text.clone()))
            .item("created_at", AttributeValue::S(comment.created_at.to_rfc3339()))
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to put comment (id: {})",
                self.table_name, comment.id
            ))
            .map_err(RepoError::Backend)?;
        Ok(())
    }

    /// One snap's thread via a filtered Scan, ascending by creation time.
    async fn list_for_snap(&self, snap_id: &str) -> Result<Vec<CommentRecord>, RepoError> {
        tracing::debug!(%snap_id, table_name = %self.table_name, "DynamoDB: Scanning comments for snap");
        let mut comments: Vec<CommentRecord> = Vec::new();
        let mut last_evaluated_key: Option<Item> = None;

        loop {
            let mut request_builder = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("snap_id = :sid")
                .expression_attribute_values(":sid", AttributeValue::S(snap_id.to_string()));

            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::Backend)?;

            for item in resp.items.unwrap_or_default() {
                match item_to_comment(&item) {
                    Some(comment) => comments.push(comment),
                    None => {
                        let item_id = item.get("id").and_then(|v| v.as_s().ok());
                        tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into CommentRecord");
                        return Err(RepoError::DataCorruption {
                            table: COMMENTS_TABLE,
                            detail: format!("unparseable item {item_id:?}"),
                        });
                    }
                }
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbProfileRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbProfileRepository {
    pub fn new(client: DynamoDbClient) -> Self {
        info!(table_name = PROFILES_TABLE, "Initializing DynamoDbProfileRepository");
        Self { client, table_name: PROFILES_TABLE.to_string() }
    }
}

#[async_trait]
impl ProfileRepository for DynamoDbProfileRepository {
    async fn list_all(&self) -> Result<Vec<ProfileRecord>, RepoError> {
        let items = scan_all(&self.client, &self.table_name).await?;
        let mut profiles = Vec::with_capacity(items.len());
        for item in items {
            match item_to_profile(&item) {
                Some(profile) => profiles.push(profile),
                None => {
                    let item_id = item.get("id").and_then(|v| v.as_s().ok());
                    tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into ProfileRecord");
                    return Err(RepoError::DataCorruption {
                        table: PROFILES_TABLE,
                        detail: format!("unparseable item {item_id:?}"),
                    });
                }
            }
        }
        Ok(profiles)
    }

    /// Point reads per id; ids with no row are skipped, not errors.
    async fn get_many(&self, ids: &[String]) -> Result<Vec<ProfileRecord>, RepoError> {
        let mut profiles = Vec::with_capacity(ids.len());
        for id in ids {
            let resp = self
                .client
                .get_item()
                .table_name(&self.table_name)
                .key("id", AttributeValue::S(id.clone()))
                .send()
                .await
                .context(format!(
                    "DynamoDB (table: {}): Failed to get profile (id: {})",
                    self.table_name, id
                ))
                .map_err(RepoError::Backend)?;

            if let Some(item) = resp.item {
                match item_to_profile(&item) {
                    Some(profile) => profiles.push(profile),
                    None => {
                        tracing::error!(profile_id = %id, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into ProfileRecord");
                        return Err(RepoError::DataCorruption {
                            table: PROFILES_TABLE,
                            detail: format!("unparseable item {id:?}"),
                        });
                    }
                }
            }
        }
        Ok(profiles)
    }
}

/// Shared paginated Scan loop.
async fn scan_all(client: &DynamoDbClient, table_name: &str) -> Result<Vec<Item>, RepoError> {
    tracing::debug!("DynamoDB: Scanning table '{}'", table_name);
    let mut items: Vec<Item> = Vec::new();
    let mut last_evaluated_key: Option<Item> = None;

    loop {
        let mut request_builder = client.scan().table_name(table_name);

        // Apply ExclusiveStartKey if paginating from previous response
        if let Some(lek) = last_evaluated_key {
            request_builder = request_builder.set_exclusive_start_key(Some(lek));
        }

        let resp = request_builder
            .send()
            .await
            .context(format!("DynamoDB: Failed to scan table '{table_name}'"))
            .map_err(RepoError::Backend)?;

        if let Some(page) = resp.items {
            tracing::debug!("DynamoDB Scan (table: {}): Returned {} items", table_name, page.len());
            items.extend(page);
        }

        last_evaluated_key = resp.last_evaluated_key;
        if last_evaluated_key.is_none() {
            break;
        }
        tracing::debug!("DynamoDB Scan (table: {}): Continuing with LastEvaluatedKey...", table_name);
    }

    Ok(items)
}

// Item parsing helpers. Required attributes missing or mistyped make the
// row unparseable; coordinates coerce leniently because numeric attributes
// come back as strings and historic rows stored them as strings outright.

fn attr_string(item: &Item, name: &str) -> Option<String> {
    item.get(name)?.as_s().ok().map(|s| s.to_string())
}

fn attr_coord(item: &Item, name: &str) -> Option<f64> {
    match item.get(name)? {
        AttributeValue::N(raw) | AttributeValue::S(raw) => coerce_coord_str(raw),
        _ => None,
    }
}

fn attr_timestamp(item: &Item, name: &str) -> Option<DateTime<Utc>> {
    let raw = item.get(name)?.as_s().ok()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
}

fn item_to_snap(item: &Item) -> Option<SnapRecord> {
    Some(SnapRecord {
        id: attr_string(item, "id")?,
        author_id: attr_string(item, "author_id")?,
        image_path: attr_string(item, "image_path")?,
        description: attr_string(item, "description")?,
        lat: attr_coord(item, "lat"),
        lng: attr_coord(item, "lng"),
        created_at: attr_timestamp(item, "created_at")?,
    })
}

fn item_to_comment(item: &Item) -> Option<CommentRecord> {
    Some(CommentRecord {
        id: attr_string(item, "id")?,
        snap_id: attr_string(item, "snap_id")?,
        author_id: attr_string(item, "author_id")?,
        text: attr_string(item, "text")?,
        created_at: attr_timestamp(item, "created_at")?,
    })
}

fn item_to_profile(item: &Item) -> Option<ProfileRecord> {
    Some(ProfileRecord {
        id: attr_string(item, "id")?,
        name: attr_string(item, "name"),
        avatar_path: attr_string(item, "avatar_path"),
    })
}
