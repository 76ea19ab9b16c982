use crate::models::{ItemId, RatingTriple, UserId};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Ordered mapping between original ids and a dense `0..n` range.
#[derive(Debug, Clone)]
pub struct DenseIndex<K> {
    ids: Vec<K>,
    positions: HashMap<K, usize>,
}

// `positions` is derived from `ids`.
impl<K: PartialEq> PartialEq for DenseIndex<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl<K: Clone + Eq + Hash + Ord> DenseIndex<K> {
    /// Builds the index over the distinct ids, in sorted order.
    pub fn from_ids<I: IntoIterator<Item = K>>(ids: I) -> Self {
        let mut ids: Vec<K> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        let positions = ids
            .iter()
            .enumerate()
            .map(|(index, id)| (id.clone(), index))
            .collect();
        Self { ids, positions }
    }

    pub fn index_of<Q>(&self, id: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.positions.get(id).copied()
    }

    pub fn contains<Q>(&self, id: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.positions.contains_key(id)
    }

    pub fn id(&self, index: usize) -> Option<&K> {
        self.ids.get(index)
    }

    pub fn ids(&self) -> &[K] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Sparse user x item rating matrix. Cells without an interaction are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingMatrix {
    users: DenseIndex<UserId>,
    items: DenseIndex<ItemId>,
    by_user: Vec<Vec<(usize, f64)>>,
    by_item: Vec<Vec<(usize, f64)>>,
}

impl RatingMatrix {
    /// Spreads long-form ratings into user rows and item columns. Repeated
    /// (user, item) pairs are averaged.
    pub fn pivot(triples: &[RatingTriple]) -> Self {
        let users = DenseIndex::from_ids(triples.iter().map(|t| t.user_id.clone()));
        let items = DenseIndex::from_ids(triples.iter().map(|t| t.item_id));

        let mut cells: BTreeMap<(usize, usize), (f64, usize)> = BTreeMap::new();
        for triple in triples {
            let (Some(u), Some(i)) = (users.index_of(triple.user_id.as_str()), items.index_of(&triple.item_id)) else {
                continue;
            };
            let cell = cells.entry((u, i)).or_insert((0.0, 0));
            cell.0 += triple.rating;
            cell.1 += 1;
        }

        let mut by_user = vec![Vec::new(); users.len()];
        let mut by_item = vec![Vec::new(); items.len()];
        for ((u, i), (sum, count)) in cells {
            let rating = sum / count as f64;
            by_user[u].push((i, rating));
            by_item[i].push((u, rating));
        }

        Self {
            users,
            items,
            by_user,
            by_item,
        }
    }

    /// Back to long-form triples in original ids, absent cells dropped.
    pub fn unpivot(&self) -> Vec<RatingTriple> {
        self.by_user
            .iter()
            .enumerate()
            .flat_map(|(u, row)| {
                row.iter().map(move |&(i, rating)| RatingTriple {
                    user_id: self.users.ids[u].clone(),
                    item_id: self.items.ids[i],
                    rating,
                })
            })
            .collect()
    }

    pub fn get(&self, user_id: &str, item_id: ItemId) -> Option<f64> {
        let u = self.users.index_of(user_id)?;
        let i = self.items.index_of(&item_id)?;
        let row = &self.by_user[u];
        row.binary_search_by_key(&i, |&(index, _)| index)
            .ok()
            .map(|pos| row[pos].1)
    }

    pub fn users(&self) -> &DenseIndex<UserId> {
        &self.users
    }

    pub fn items(&self) -> &DenseIndex<ItemId> {
        &self.items
    }

    pub fn user_ids(&self) -> &[UserId] {
        self.users.ids()
    }

    pub fn item_ids(&self) -> &[ItemId] {
        self.items.ids()
    }

    /// Ratings of one user as `(dense item index, rating)`.
    pub fn user_row(&self, user: usize) -> &[(usize, f64)] {
        &self.by_user[user]
    }

    /// Ratings of one item as `(dense user index, rating)`.
    pub fn item_column(&self, item: usize) -> &[(usize, f64)] {
        &self.by_item[item]
    }

    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn nnz(&self) -> usize {
        self.by_user.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn key(t: &RatingTriple) -> (String, ItemId, u64) {
        (t.user_id.clone(), t.item_id, t.rating.to_bits())
    }

    fn sample() -> Vec<RatingTriple> {
        vec![
            RatingTriple::new("zoe", 30, 1.5),
            RatingTriple::new("adam", 10, 0.25),
            RatingTriple::new("adam", 30, 4.0),
            RatingTriple::new("mia", 20, 0.0),
        ]
    }

    #[test]
    fn test_round_trip_is_set_equal() {
        let triples = sample();
        let matrix = RatingMatrix::pivot(&triples);

        let before: HashSet<_> = triples.iter().map(key).collect();
        let after: HashSet<_> = matrix.unpivot().iter().map(key).collect();
        assert_eq!(before, after);
        assert_eq!(matrix.nnz(), triples.len());
    }

    #[test]
    fn test_missing_cells_are_absent_not_zero() {
        let matrix = RatingMatrix::pivot(&sample());

        assert_eq!(matrix.get("mia", 20), Some(0.0));
        assert_eq!(matrix.get("mia", 10), None);
        assert_eq!(matrix.get("nobody", 10), None);
    }

    #[test]
    fn test_dense_indices_recover_original_ids() {
        let matrix = RatingMatrix::pivot(&sample());

        assert_eq!(matrix.user_ids(), &["adam", "mia", "zoe"]);
        assert_eq!(matrix.item_ids(), &[10, 20, 30]);

        let zoe = matrix.users().index_of("zoe").unwrap();
        assert_eq!(matrix.users().id(zoe).map(String::as_str), Some("zoe"));
        assert_eq!(matrix.user_row(zoe), &[(2, 1.5)]);

        let item_30 = matrix.items().index_of(&30).unwrap();
        assert_eq!(matrix.item_column(item_30).len(), 2);
    }

    #[test]
    fn test_dense_index_ignores_input_order() {
        let a = DenseIndex::from_ids(vec![30, 10, 20, 10]);
        let b = DenseIndex::from_ids(vec![10, 20, 30]);
        assert_eq!(a, b);
        assert_ne!(a, DenseIndex::from_ids(vec![10, 20]));

        assert_eq!(RatingMatrix::pivot(&sample()), RatingMatrix::pivot(&sample()));
    }

    #[test]
    fn test_duplicate_pairs_are_averaged() {
        let triples = vec![
            RatingTriple::new("adam", 10, 1.0),
            RatingTriple::new("adam", 10, 3.0),
        ];
        let matrix = RatingMatrix::pivot(&triples);
        assert_eq!(matrix.get("adam", 10), Some(2.0));
        assert_eq!(matrix.unpivot().len(), 1);
    }

    fn distinct_triples() -> impl Strategy<Value = Vec<RatingTriple>> {
        proptest::collection::btree_map((0..6u8, 0..12i64), 0.0..6.0f64, 0..40).prop_map(|cells| {
            cells
                .into_iter()
                .map(|((user, item), rating)| RatingTriple::new(format!("user{}", user), item, rating))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_unpivot_inverts_pivot(triples in distinct_triples()) {
            let matrix = RatingMatrix::pivot(&triples);

            let before: HashSet<_> = triples.iter().map(key).collect();
            let after: HashSet<_> = matrix.unpivot().iter().map(key).collect();
            prop_assert_eq!(before, after);
            prop_assert_eq!(matrix.nnz(), triples.len());
            for t in &triples {
                prop_assert_eq!(matrix.get(&t.user_id, t.item_id), Some(t.rating));
            }
        }
    }
}
