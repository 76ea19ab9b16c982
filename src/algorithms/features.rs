use crate::models::{ItemAttributeRow, ItemFeature, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How items without rows in some attribute category are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Keep every item; a missing category becomes an empty list.
    #[default]
    Outer,
    /// Drop items that lack tags, genres or languages.
    Inner,
}

#[derive(Debug, Default)]
struct Accumulator {
    name: String,
    tags: Vec<String>,
    genres: Vec<String>,
    languages: Vec<String>,
}

fn push_unique(values: &mut Vec<String>, value: Option<&String>) {
    if let Some(value) = value {
        if !values.iter().any(|v| v == value) {
            values.push(value.clone());
        }
    }
}

/// Collapses joined attribute rows into exactly one feature record per item,
/// in first-seen item order.
pub fn build_item_features(rows: &[ItemAttributeRow], policy: JoinPolicy) -> Vec<ItemFeature> {
    let mut order: Vec<ItemId> = Vec::new();
    let mut groups: HashMap<ItemId, Accumulator> = HashMap::new();

    for row in rows {
        let acc = groups.entry(row.item_id).or_insert_with(|| {
            order.push(row.item_id);
            Accumulator {
                name: row.item_name.clone(),
                ..Default::default()
            }
        });

        push_unique(&mut acc.tags, row.tag_name.as_ref());
        push_unique(&mut acc.genres, row.genre_name.as_ref());
        push_unique(&mut acc.languages, row.language_name.as_ref());
    }

    order
        .into_iter()
        .filter_map(|item_id| {
            let acc = groups.remove(&item_id)?;
            if policy == JoinPolicy::Inner
                && (acc.tags.is_empty() || acc.genres.is_empty() || acc.languages.is_empty())
            {
                return None;
            }

            let feature = acc
                .tags
                .iter()
                .chain(&acc.genres)
                .chain(&acc.languages)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();

            Some(ItemFeature {
                item_id,
                name: acc.name,
                tags: acc.tags,
                genres: acc.genres,
                languages: acc.languages,
                feature,
            })
        })
        .collect()
}
