use std::collections::{BTreeMap, HashSet};

/// English stop words, same list scikit-learn ships.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can",
    "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do",
    "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or",
    "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "part",
    "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together", "too",
    "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up", "upon",
    "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Sparse L2-normalized row: `(term index, weight)` sorted by term index.
pub type SparseRow = Vec<(usize, f64)>;

#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    ngram_range: (usize, usize),
    min_token_len: usize,
    stop_words: Option<HashSet<String>>,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self {
            ngram_range: (1, 1),
            min_token_len: 1,
            stop_words: None,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn with_ngram_range(mut self, min_n: usize, max_n: usize) -> Self {
        let min_n = min_n.max(1);
        self.ngram_range = (min_n, max_n.max(min_n));
        self
    }

    pub fn with_min_token_len(mut self, len: usize) -> Self {
        self.min_token_len = len.max(1);
        self
    }

    pub fn with_stop_words_english(mut self) -> Self {
        self.stop_words = Some(ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect());
        self
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn term_index(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    /// Lower-cased word tokens with stop words removed.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| t.chars().count() >= self.min_token_len)
            .map(str::to_lowercase)
            .filter(|t| {
                self.stop_words
                    .as_ref()
                    .map_or(true, |stop| !stop.contains(t))
            })
            .collect()
    }

    pub fn analyze(&self, text: &str) -> Vec<String> {
        let tokens = self.tokenize(text);
        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();

        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    /// Learns the vocabulary and idf weights, returning the document rows.
    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Vec<SparseRow> {
        let analyzed: Vec<Vec<String>> = documents.iter().map(|d| self.analyze(d.as_ref())).collect();

        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        for terms in &analyzed {
            let unique: HashSet<&String> = terms.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let n_docs = documents.len() as f64;
        self.vocabulary = doc_freq
            .keys()
            .enumerate()
            .map(|(index, term)| (term.clone(), index))
            .collect();
        // Smooth idf: ln((1 + n) / (1 + df)) + 1
        self.idf = doc_freq
            .values()
            .map(|&df| ((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        analyzed.iter().map(|terms| self.weigh(terms)).collect()
    }

    /// Projects a document onto the fitted vocabulary; unknown terms are ignored.
    pub fn transform(&self, document: &str) -> SparseRow {
        self.weigh(&self.analyze(document))
    }

    fn weigh(&self, terms: &[String]) -> SparseRow {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in terms {
            if let Some(&index) = self.vocabulary.get(term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseRow = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * self.idf[index]))
            .collect();

        let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in row.iter_mut() {
                *w /= norm;
            }
        }
        row
    }
}

/// Dot product of two sparse rows sorted by term index.
pub fn sparse_dot(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_stop_words_and_punctuation() {
        let vectorizer = TfidfVectorizer::new().with_stop_words_english();
        let tokens = vectorizer.tokenize("['Free to Play', 'The Action']");
        assert_eq!(tokens, vec!["free", "play", "action"]);
    }

    #[test]
    fn test_ngrams_built_after_stop_word_removal() {
        let vectorizer = TfidfVectorizer::new()
            .with_ngram_range(1, 3)
            .with_stop_words_english();
        let terms = vectorizer.analyze("free to play rpg");
        assert!(terms.contains(&"free play".to_string()));
        assert!(terms.contains(&"free play rpg".to_string()));
        assert_eq!(terms.len(), 3 + 2 + 1);
    }

    #[test]
    fn test_rows_are_unit_length() {
        let mut vectorizer = TfidfVectorizer::new().with_ngram_range(1, 2);
        let rows = vectorizer.fit_transform(&["action indie", "action rpg", ""]);

        for row in &rows[..2] {
            let norm: f64 = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
        assert!(rows[2].is_empty());
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let mut vectorizer = TfidfVectorizer::new();
        let rows = vectorizer.fit_transform(&["action indie", "action rpg", "action"]);

        let action = vectorizer.term_index("action").unwrap();
        let indie = vectorizer.term_index("indie").unwrap();
        let weight = |term| rows[0].iter().find(|(i, _)| *i == term).unwrap().1;
        assert!(weight(indie) > weight(action));
    }

    #[test]
    fn test_sparse_dot() {
        let a = vec![(0, 1.0), (2, 2.0), (5, 1.0)];
        let b = vec![(2, 3.0), (4, 1.0), (5, 2.0)];
        assert!((sparse_dot(&a, &b) - 8.0).abs() < 1e-12);
    }
}
