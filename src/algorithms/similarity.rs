use crate::algorithms::tfidf::{sparse_dot, TfidfVectorizer};
use crate::error::{RecError, Result};
use crate::models::{ItemFeature, ItemId, SimilarItem};
use crate::utils::top_k_excluding;
use ndarray::Array2;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::info;

/// Fitted TF-IDF vectors and the full pairwise similarity matrix of a catalog.
///
/// Items are addressed by id. Name lookup is a convenience: when several items
/// share a display name, the name resolves to the first one in catalog order.
#[derive(Debug, Clone)]
pub struct ContentIndex {
    items: Vec<ItemFeature>,
    by_id: HashMap<ItemId, usize>,
    by_name: HashMap<String, usize>,
    similarity: Array2<f32>,
    vocabulary_len: usize,
}

impl ContentIndex {
    pub fn fit(items: Vec<ItemFeature>, mut vectorizer: TfidfVectorizer) -> Result<Self> {
        if items.len() < 2 {
            return Err(RecError::DegenerateInput(format!(
                "content similarity needs at least 2 items, got {}",
                items.len()
            )));
        }

        let documents: Vec<&str> = items.iter().map(|i| i.feature.as_str()).collect();
        let rows = vectorizer.fit_transform(&documents);
        let n = rows.len();

        // Linear kernel on L2-normalized rows, i.e. cosine similarity.
        let scores: Vec<f32> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let rows = &rows;
                (0..n).map(move |j| sparse_dot(&rows[i], &rows[j]) as f32)
            })
            .collect();
        let similarity = Array2::from_shape_vec((n, n), scores)
            .map_err(|e| RecError::DegenerateInput(e.to_string()))?;

        let mut by_id = HashMap::with_capacity(n);
        let mut by_name = HashMap::with_capacity(n);
        for (index, item) in items.iter().enumerate() {
            by_id.entry(item.item_id).or_insert(index);
            by_name.entry(item.name.clone()).or_insert(index);
        }

        info!(
            "Fitted content index over {} items ({} terms)",
            n,
            vectorizer.vocabulary_len()
        );

        Ok(Self {
            items,
            by_id,
            by_name,
            similarity,
            vocabulary_len: vectorizer.vocabulary_len(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary_len
    }

    pub fn items(&self) -> &[ItemFeature] {
        &self.items
    }

    pub fn similarity(&self, a: ItemId, b: ItemId) -> Result<f32> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Ok(self.similarity[[i, j]])
    }

    pub fn recommend_by_name(&self, name: &str, n: usize) -> Result<Vec<String>> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| RecError::item_name(name))?;

        Ok(self
            .ranked(index, n)
            .into_iter()
            .map(|(j, _)| self.items[j].name.clone())
            .collect())
    }

    pub fn recommend_by_id(&self, item_id: ItemId, n: usize) -> Result<Vec<SimilarItem>> {
        let index = self.index_of(item_id)?;

        Ok(self
            .ranked(index, n)
            .into_iter()
            .map(|(j, score)| SimilarItem {
                item_id: self.items[j].item_id,
                name: self.items[j].name.clone(),
                score,
            })
            .collect())
    }

    fn index_of(&self, item_id: ItemId) -> Result<usize> {
        self.by_id
            .get(&item_id)
            .copied()
            .ok_or_else(|| RecError::item_id(item_id))
    }

    fn ranked(&self, index: usize, n: usize) -> Vec<(usize, f32)> {
        let row = self.similarity.row(index).to_vec();
        top_k_excluding(&row, n, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::features::{build_item_features, JoinPolicy};
    use crate::models::ItemAttributeRow;
    use proptest::prelude::*;

    fn vectorizer() -> TfidfVectorizer {
        TfidfVectorizer::new()
            .with_ngram_range(1, 3)
            .with_stop_words_english()
    }

    fn feature(item_id: ItemId, name: &str, text: &str) -> ItemFeature {
        ItemFeature {
            item_id,
            name: name.to_string(),
            tags: Vec::new(),
            genres: Vec::new(),
            languages: Vec::new(),
            feature: text.to_string(),
        }
    }

    #[test]
    fn test_shared_tag_ranks_first() {
        let rows = vec![
            ItemAttributeRow::new(1, "A").with_tag("x"),
            ItemAttributeRow::new(2, "B").with_tag("x"),
            ItemAttributeRow::new(2, "B").with_tag("y"),
            ItemAttributeRow::new(3, "C").with_tag("z"),
        ];
        let items = build_item_features(&rows, JoinPolicy::Outer);
        let index = ContentIndex::fit(items, vectorizer()).unwrap();

        assert_eq!(index.recommend_by_name("A", 10).unwrap(), vec!["B", "C"]);
    }

    #[test]
    fn test_query_item_never_returned() {
        let items: Vec<_> = (0..15)
            .map(|i| feature(i, &format!("game {}", i), "action indie"))
            .collect();
        let index = ContentIndex::fit(items, vectorizer()).unwrap();

        for i in 0..15 {
            let name = format!("game {}", i);
            let result = index.recommend_by_name(&name, 10).unwrap();
            assert_eq!(result.len(), 10);
            assert!(!result.contains(&name));
        }
    }

    #[test]
    fn test_zero_vector_query_excludes_itself() {
        let items = vec![
            feature(1, "A", "rpg"),
            feature(2, "B", "rpg"),
            feature(3, "C", ""),
        ];
        let index = ContentIndex::fit(items, vectorizer()).unwrap();
        assert_eq!(index.recommend_by_name("C", 10).unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_duplicate_names_resolve_to_first() {
        let items = vec![
            feature(1, "Twin", "space shooter"),
            feature(2, "Twin", "farming"),
            feature(3, "Other", "space shooter"),
            feature(4, "Farm", "farming"),
        ];
        let index = ContentIndex::fit(items, vectorizer()).unwrap();

        let by_name = index.recommend_by_name("Twin", 1).unwrap();
        assert_eq!(by_name, vec!["Other"]);

        let by_id = index.recommend_by_id(2, 1).unwrap();
        assert_eq!(by_id[0].item_id, 4);
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let items = vec![feature(1, "A", "rpg"), feature(2, "B", "rpg")];
        let index = ContentIndex::fit(items, vectorizer()).unwrap();
        assert!(index.recommend_by_name("Z", 10).unwrap_err().is_not_found());
    }

    #[test]
    fn test_single_item_catalog_is_degenerate() {
        let result = ContentIndex::fit(vec![feature(1, "A", "rpg")], vectorizer());
        assert!(matches!(result, Err(RecError::DegenerateInput(_))));
    }

    #[test]
    fn test_similarity_is_symmetric_and_self_one() {
        let items = vec![feature(1, "A", "rpg open world"), feature(2, "B", "rpg")];
        let index = ContentIndex::fit(items, vectorizer()).unwrap();

        assert!((index.similarity(1, 1).unwrap() - 1.0).abs() < 1e-5);
        assert_eq!(index.similarity(1, 2).unwrap(), index.similarity(2, 1).unwrap());
    }

    const WORDS: [&str; 8] = ["rpg", "open world", "puzzle", "co op", "sci fi", "pixel", "strategy", "indie"];

    fn catalog() -> impl Strategy<Value = Vec<ItemFeature>> {
        proptest::collection::vec(proptest::collection::vec(0..WORDS.len(), 0..4), 2..30).prop_map(|docs| {
            docs.into_iter()
                .enumerate()
                .map(|(i, words)| {
                    let text: Vec<&str> = words.into_iter().map(|w| WORDS[w]).collect();
                    feature(i as ItemId, &format!("game {}", i), &text.join(" "))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_results_exclude_query_and_fill_up_to_ten(items in catalog(), pick in any::<prop::sample::Index>()) {
            let n = items.len();
            let query = pick.index(n);
            let index = ContentIndex::fit(items, vectorizer()).unwrap();

            let name = format!("game {}", query);
            let names = index.recommend_by_name(&name, 10).unwrap();
            prop_assert_eq!(names.len(), 10.min(n - 1));
            prop_assert!(!names.contains(&name));

            let similar = index.recommend_by_id(query as ItemId, 10).unwrap();
            prop_assert!(similar.iter().all(|s| s.item_id != query as ItemId));
            prop_assert!(similar.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}
