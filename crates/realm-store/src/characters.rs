//! Characters repository
//!
//! Read-only access to the `{"succubi": [...]}` document, joined with like
//! counts from the likes repository.

use crate::error::StoreResult;
use crate::likes::LikesRepository;
use crate::store::JsonStore;
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One character card
///
/// Every known field decodes leniently: absent, `null` or mistyped values
/// become the field's default, so one bad card never hides the others.
/// Unknown fields are kept in `extra` and written back out on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Positive id; `None` marks malformed content
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Display name
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    /// Character type
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    /// Origin
    #[serde(default, deserialize_with = "lenient")]
    pub origin: String,
    /// Overall power
    #[serde(default, deserialize_with = "lenient")]
    pub power: i64,
    /// Ability name → score; non-integer scores are dropped
    #[serde(default, deserialize_with = "lenient_abilities")]
    pub abilities: BTreeMap<String, i64>,
    /// Profile text
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    /// Image path or URL
    #[serde(default, deserialize_with = "lenient")]
    pub image: String,
    /// Fields this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Character {
    /// Id if present and non-zero
    #[inline]
    #[must_use]
    pub fn valid_id(&self) -> Option<u64> {
        self.id.filter(|id| *id > 0)
    }
}

/// The character file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharactersDocument {
    /// All characters, in file order; entries that are not objects decode as
    /// empty cards
    #[serde(default, deserialize_with = "lenient_cards")]
    pub succubi: Vec<Character>,
}

/// Decode a field, substituting the default for `null` or a wrong type
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn lenient_abilities<'de, D>(deserializer: D) -> Result<BTreeMap<String, i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(abilities) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(abilities
        .into_iter()
        .filter_map(|(name, score)| score.as_i64().map(|score| (name, score)))
        .collect())
}

/// Cards decode one by one; a list that is neither an array nor `null` fails
fn lenient_cards<'de, D>(deserializer: D) -> Result<Vec<Character>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(cards) => Ok(cards
            .into_iter()
            .map(|card| Character::deserialize(card).unwrap_or_default())
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(D::Error::custom(format!(
            "`succubi` must be an array, found {other}"
        ))),
    }
}

/// Character joined with its like count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterWithLikes {
    /// The character record
    #[serde(flatten)]
    pub character: Character,
    /// Current like count
    #[serde(rename = "likeCount")]
    pub like_count: u64,
}

/// Repository over the character file
#[derive(Debug, Clone)]
pub struct CharactersRepository {
    store: Arc<JsonStore>,
    path: PathBuf,
    likes: LikesRepository,
}

impl CharactersRepository {
    /// Create repository for the character file at path
    #[must_use]
    pub fn new(store: Arc<JsonStore>, path: impl Into<PathBuf>, likes: LikesRepository) -> Self {
        Self {
            store,
            path: path.into(),
            likes,
        }
    }

    /// Character file path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all characters; an unreadable file yields none
    pub async fn read_all(&self) -> CharactersDocument {
        self.store
            .safe_read(&self.path, Some(CharactersDocument::default()))
            .await
            .unwrap_or_default()
    }

    /// Load all characters, failing on an unreadable file
    ///
    /// # Errors
    /// - `StoreError::Io` if the file cannot be read
    /// - `StoreError::Parse` if its content is malformed
    pub async fn try_read_all(&self) -> StoreResult<CharactersDocument> {
        self.store.safe_read(&self.path, None).await
    }

    /// Find a character by id; 0 is never a valid id
    pub async fn get_by_id(&self, id: u64) -> Option<Character> {
        if id == 0 {
            return None;
        }
        let found = self
            .read_all()
            .await
            .succubi
            .into_iter()
            .find(|c| c.id == Some(id));
        if found.is_none() {
            tracing::debug!(character_id = id, "character not found");
        }
        found
    }

    /// Ids of all characters that have one
    pub async fn get_all_ids(&self) -> Vec<u64> {
        self.read_all()
            .await
            .succubi
            .iter()
            .filter_map(Character::valid_id)
            .collect()
    }

    /// Character with its like count, or `None` if it does not exist
    pub async fn get_with_like_count(&self, id: u64) -> Option<CharacterWithLikes> {
        let character = self.get_by_id(id).await?;
        let like_count = self.likes.get_count(id).await;
        Some(CharacterWithLikes {
            character,
            like_count,
        })
    }

    /// Every character with its like count
    ///
    /// Reads the likes document once for the whole list.
    pub async fn get_all_with_like_counts(&self) -> Vec<CharacterWithLikes> {
        let characters = self.read_all().await;
        let likes = self.likes.read().await;
        characters
            .succubi
            .into_iter()
            .map(|character| {
                let like_count = character.valid_id().map_or(0, |id| likes.count(id));
                CharacterWithLikes {
                    character,
                    like_count,
                }
            })
            .collect()
    }

    /// Characters by popularity: most likes first, ties by ascending id
    pub async fn ranking(&self, limit: Option<usize>) -> Vec<CharacterWithLikes> {
        let mut ranked = self.get_all_with_like_counts().await;
        ranked.sort_by(|a, b| {
            b.like_count
                .cmp(&a.like_count)
                .then_with(|| a.character.id.cmp(&b.character.id))
        });
        if let Some(limit) = limit {
            ranked.truncate(limit);
        }
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(characters: &Value) -> (TempDir, CharactersRepository) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::new(".backup"));
        let characters_path = dir.path().join("succubi-data.json");
        std::fs::write(&characters_path, characters.to_string()).unwrap();
        let likes = LikesRepository::new(Arc::clone(&store), dir.path().join("likes-data.json"));
        let repo = CharactersRepository::new(store, characters_path, likes);
        (dir, repo)
    }

    fn sample() -> Value {
        json!({
            "succubi": [
                {
                    "id": 1,
                    "name": "Lilith",
                    "type": "Queen",
                    "origin": "Eden",
                    "power": 95,
                    "abilities": {"charm": 99, "magic": 90},
                    "description": "First of her kind",
                    "image": "img/lilith.png",
                    "rarity": "SSR"
                },
                {"id": 2, "name": "Morrigan"},
                {"id": 3, "name": "Nyx"}
            ]
        })
    }

    #[tokio::test]
    async fn read_all_parses_characters() {
        let (_dir, repo) = setup(&sample());
        let doc = repo.read_all().await;
        assert_eq!(doc.succubi.len(), 3);

        let lilith = &doc.succubi[0];
        assert_eq!(lilith.kind, "Queen");
        assert_eq!(lilith.abilities.get("charm"), Some(&99));
        assert_eq!(lilith.extra.get("rarity"), Some(&json!("SSR")));
    }

    #[tokio::test]
    async fn read_all_on_missing_file_is_empty() {
        let (dir, repo) = setup(&sample());
        std::fs::remove_file(dir.path().join("succubi-data.json")).unwrap();

        assert!(repo.read_all().await.succubi.is_empty());
        assert!(repo.try_read_all().await.is_err());
    }

    #[tokio::test]
    async fn get_by_id_finds_and_misses() {
        let (_dir, repo) = setup(&sample());
        assert_eq!(repo.get_by_id(2).await.unwrap().name, "Morrigan");
        assert!(repo.get_by_id(42).await.is_none());
        assert!(repo.get_by_id(0).await.is_none());
    }

    #[tokio::test]
    async fn all_ids_skip_characters_without_id() {
        let (_dir, repo) = setup(&json!({
            "succubi": [{"id": 4}, {"name": "Nameless"}, {"id": 0}, {"id": 9}]
        }));
        assert_eq!(repo.get_all_ids().await, vec![4, 9]);
    }

    #[tokio::test]
    async fn with_like_count_defaults_to_zero() {
        let (_dir, repo) = setup(&sample());
        let joined = repo.get_with_like_count(3).await.unwrap();
        assert_eq!(joined.like_count, 0);
        assert!(repo.get_with_like_count(99).await.is_none());
    }

    #[tokio::test]
    async fn all_with_like_counts_joins_every_character() {
        let (_dir, repo) = setup(&sample());
        repo.likes.increment(2).await.unwrap();
        repo.likes.increment(2).await.unwrap();

        let joined = repo.get_all_with_like_counts().await;
        let counts: Vec<_> = joined
            .iter()
            .map(|c| (c.character.id.unwrap(), c.like_count))
            .collect();
        assert_eq!(counts, vec![(1, 0), (2, 2), (3, 0)]);
    }

    #[tokio::test]
    async fn ranking_orders_by_likes_then_id() {
        let (_dir, repo) = setup(&sample());
        repo.likes.increment(3).await.unwrap();
        repo.likes.increment(3).await.unwrap();
        repo.likes.increment(1).await.unwrap();

        let ids: Vec<_> = repo
            .ranking(None)
            .await
            .iter()
            .map(|c| c.character.id.unwrap())
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(repo.ranking(Some(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn one_malformed_card_does_not_hide_the_others() {
        let (_dir, repo) = setup(&json!({
            "succubi": [
                {"id": 1, "name": "Lilith", "power": 95},
                {"id": 2, "name": "Morrigan", "description": null, "power": 87.5},
                {"id": 3, "name": null, "abilities": {"charm": 8, "grace": "high"}},
                "not a card",
                {"id": "4", "name": "Stringly"}
            ]
        }));

        let doc = repo.try_read_all().await.unwrap();
        assert_eq!(doc.succubi.len(), 5);
        assert_eq!(repo.get_by_id(1).await.unwrap().power, 95);

        let morrigan = repo.get_by_id(2).await.unwrap();
        assert_eq!(morrigan.description, "");
        assert_eq!(morrigan.power, 0);

        let third = repo.get_by_id(3).await.unwrap();
        assert_eq!(third.name, "");
        assert_eq!(third.abilities, BTreeMap::from([("charm".to_string(), 8)]));

        assert_eq!(repo.get_all_ids().await, vec![1, 2, 3]);
        assert_eq!(repo.ranking(None).await.len(), 5);
    }

    #[tokio::test]
    async fn non_array_character_list_is_unreadable() {
        let (_dir, repo) = setup(&json!({"succubi": {"id": 1}}));
        assert!(repo.try_read_all().await.is_err());
        assert!(repo.read_all().await.succubi.is_empty());
    }

    #[test]
    fn joined_record_serializes_flat() {
        let joined = CharacterWithLikes {
            character: Character {
                id: Some(5),
                name: "Lamia".to_string(),
                ..Character::default()
            },
            like_count: 7,
        };
        let value = serde_json::to_value(&joined).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["name"], "Lamia");
        assert_eq!(value["likeCount"], 7);
    }
}
