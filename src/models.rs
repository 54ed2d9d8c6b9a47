use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Practical cap on snap descriptions.
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Cap on comment text.
pub const MAX_COMMENT_LEN: usize = 300;

/// A published post row from the `snaps` table.
///
/// Coordinates may arrive as numbers or numeric strings depending on the
/// backend row shape; both deserialize through the same coercion and end up
/// as `None` when missing or non-numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapRecord {
    pub id: String,
    pub author_id: String,
    /// Relative object path within the images bucket, never a full URL.
    pub image_path: String,
    pub description: String,
    #[serde(deserialize_with = "lenient_coord", default)]
    pub lat: Option<f64>,
    #[serde(deserialize_with = "lenient_coord", default)]
    pub lng: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A comment row from the `comments` table. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub snap_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// An author profile row from the `profiles` table. Read-only here; joined
/// onto snaps and comments by id lookup, never embedded at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub name: Option<String>,
    pub avatar_path: Option<String>,
}

/// A snap joined with its author profile. The profile is denormalized at
/// read time; a failed author lookup leaves `author` empty and the snap is
/// still shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snap {
    #[serde(flatten)]
    pub record: SnapRecord,
    pub author: Option<ProfileRecord>,
}

impl Snap {
    /// Both coordinates, when present and finite. Snaps without a valid
    /// pair are not placeable on the map.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.record
            .lat
            .zip(self.record.lng)
            .filter(|(lat, lng)| lat.is_finite() && lng.is_finite())
    }

    pub fn author_name(&self) -> Option<&str> {
        self.author.as_ref().and_then(|p| p.name.as_deref())
    }
}

/// A comment joined with its author's display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentView {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author_name: Option<String>,
}

/// The authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: Option<String>,
}

/// Coerces a JSON value into a finite coordinate. Numbers and numeric
/// strings agree; anything else is `None`.
pub fn coerce_coord(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => coerce_coord_str(s),
        _ => None,
    }
}

/// String-side half of the coordinate coercion, shared with row parsers
/// whose numeric attributes arrive as strings.
pub fn coerce_coord_str(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn lenient_coord<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_coord))
}

/// Char-safe prefix truncation with an ellipsis, as the display surfaces
/// apply to long descriptions.
pub fn truncate_display(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}...")
}

/// Char-safe hard cap without an ellipsis, for write-side input limits.
pub fn clamp_input(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
