//! Graph datasets: adjacency, node features, multi-label targets and the
//! train/validation/test node splits.
//!
//! `load_data` resolves a dataset identifier to one of:
//! - `movielens-classification`: read from `<root>/movielens-classification/`
//!   - `movies.csv` header row, an id column (`MovielensID`, `MovieID` or `id`)
//!     and a `Genre` column with `|` separated labels
//!   - `embeddings.csv` no header, one row of floats per movie in `movies.csv` order
//!   - `ratings.csv` header row with `UserID`, `MovieID` and `Rating`
//!   - `train.csv`, `validation.csv`, `test.csv` optional, first column holds movie ids.
//!     When they are missing a seeded 60/20/20 random split is used.
//! - `synthetic`: a small seeded community graph, useful for smoke runs
//!
//! Two movies are linked iff at least `min_shared_ratings` users gave both the
//! same rating.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use ndarray::{Array2, Axis};
use tracing::{debug, info};

use crate::{
    config::Device,
    error::{Error, Result},
    graph::Adjacency,
};

pub const MOVIELENS_CLASSIFICATION: &str = "movielens-classification";
pub const SYNTHETIC: &str = "synthetic";

const MOVIE_ID_COLUMNS: &[&str] = &["movielensid", "movieid", "id"];
const GENRE_COLUMNS: &[&str] = &["genre", "genres"];
const USER_ID_COLUMNS: &[&str] = &["userid", "user"];
const RATING_COLUMNS: &[&str] = &["rating"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

/// Everything the training loop needs, created once and never resized.
#[derive(Debug, Clone)]
pub struct GraphData {
    pub adj: Adjacency,
    pub features: Array2<f32>,
    pub labels: Array2<f32>,
    pub idx_train: Vec<usize>,
    pub idx_val: Vec<usize>,
    pub idx_test: Vec<usize>,
    pub label_names: Vec<String>,
}

impl GraphData {
    /// Checks that shapes agree and the splits are in range and disjoint
    pub fn new(
        adj: Adjacency,
        features: Array2<f32>,
        labels: Array2<f32>,
        idx_train: Vec<usize>,
        idx_val: Vec<usize>,
        idx_test: Vec<usize>,
        label_names: Vec<String>,
    ) -> Result<Self> {
        let nodes = adj.nodes();
        if features.nrows() != nodes {
            return Err(Error::Shape(format!(
                "{} feature rows for {nodes} nodes",
                features.nrows()
            )));
        }
        if labels.nrows() != nodes {
            return Err(Error::Shape(format!(
                "{} label rows for {nodes} nodes",
                labels.nrows()
            )));
        }
        if label_names.len() != labels.ncols() {
            return Err(Error::Shape(format!(
                "{} label names for {} label columns",
                label_names.len(),
                labels.ncols()
            )));
        }
        if labels.iter().any(|&v| v != 0. && v != 1.) {
            return Err(Error::Shape("labels must be binary".to_string()));
        }

        let mut seen = HashSet::new();
        for (name, idx) in [("train", &idx_train), ("val", &idx_val), ("test", &idx_test)] {
            for &i in idx.iter() {
                if i >= nodes {
                    return Err(Error::Split(format!(
                        "{name} index {i} out of range for {nodes} nodes"
                    )));
                }
                if !seen.insert(i) {
                    return Err(Error::Split(format!("index {i} appears twice ({name})")));
                }
            }
        }

        Ok(Self {
            adj,
            features,
            labels,
            idx_train,
            idx_val,
            idx_test,
            label_names,
        })
    }

    pub fn nodes(&self) -> usize {
        self.adj.nodes()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.ncols()
    }

    pub fn indices(&self, split: Split) -> &[usize] {
        match split {
            Split::Train => &self.idx_train,
            Split::Val => &self.idx_val,
            Split::Test => &self.idx_test,
        }
    }

    /// Label rows of one split, in split order
    pub fn split_labels(&self, split: Split) -> Array2<f32> {
        self.labels.select(Axis(0), self.indices(split))
    }

    /// Seeded community graph: every node belongs to one primary class, its
    /// features are a noisy class centroid, and edges mostly stay inside a class.
    pub fn synthetic(
        nodes: usize,
        features: usize,
        classes: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Self> {
        if classes == 0 {
            return Err(Error::Shape("synthetic graph needs at least one class".into()));
        }
        let primary: Vec<usize> = (0..nodes).map(|i| i % classes).collect();

        let centroids = Array2::from_shape_fn((classes, features), |_| rng.f32() * 2. - 1.);
        let feats = Array2::from_shape_fn((nodes, features), |(n, f)| {
            centroids[[primary[n], f]] + (rng.f32() - 0.5) * 0.5
        });

        let mut labels = Array2::zeros((nodes, classes));
        for (n, &c) in primary.iter().enumerate() {
            labels[[n, c]] = 1.;
            //some nodes carry a second label
            if rng.f32() < 0.2 {
                labels[[n, rng.usize(0..classes)]] = 1.;
            }
        }

        let per_class = (nodes / classes).max(1) as f32;
        let p_in = (4. / per_class).min(1.);
        let p_out = 0.2 / nodes.max(1) as f32;
        let mut edges = vec![];
        for a in 0..nodes {
            for b in (a + 1)..nodes {
                let p = if primary[a] == primary[b] { p_in } else { p_out };
                if rng.f32() < p {
                    edges.push((a, b));
                }
            }
        }
        let adj = Adjacency::from_edges(nodes, &edges)?;
        let (idx_train, idx_val, idx_test) = random_split(nodes, rng);
        let label_names = (0..classes).map(|c| format!("class{c}")).collect();

        GraphData::new(adj, feats, labels, idx_train, idx_val, idx_test, label_names)
    }
}

/// Options that affect how a dataset is turned into a graph
#[derive(Debug, Clone, PartialEq)]
pub struct DataOptions {
    pub min_shared_ratings: usize,
    /// seeds random splits and the synthetic graph
    pub seed: u64,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            min_shared_ratings: 2,
            seed: 42,
        }
    }
}

/// Loads a dataset by identifier from `root`
pub fn load_data(
    name: &str,
    root: impl AsRef<Path>,
    options: &DataOptions,
    device: Device,
) -> Result<GraphData> {
    info!(dataset = name, %device, "loading data");
    let data = match name {
        MOVIELENS_CLASSIFICATION => load_movielens(root.as_ref().join(name), options)?,
        SYNTHETIC => {
            let mut rng = fastrand::Rng::with_seed(options.seed);
            GraphData::synthetic(300, 16, 6, &mut rng)?
        }
        _ => return Err(Error::UnknownDataset(name.to_string())),
    };
    info!(
        nodes = data.nodes(),
        edges = data.adj.edge_count(),
        features = data.num_features(),
        classes = data.num_classes(),
        train = data.idx_train.len(),
        val = data.idx_val.len(),
        test = data.idx_test.len(),
        "loaded"
    );
    Ok(data)
}

/// Shuffles `0..nodes` and cuts it 60/20/20
pub fn random_split(nodes: usize, rng: &mut fastrand::Rng) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..nodes).collect();
    rng.shuffle(&mut indices);
    let train = nodes * 6 / 10;
    let val = nodes * 2 / 10;
    let test = indices.split_off(train + val);
    let val = indices.split_off(train);
    (indices, val, test)
}

fn load_movielens(dir: impl AsRef<Path>, options: &DataOptions) -> Result<GraphData> {
    let dir = dir.as_ref();

    let movies = read_movies(&dir.join("movies.csv"))?;
    let nodes = movies.ids.len();
    let id_to_node: HashMap<&str, usize> = movies
        .ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    if id_to_node.len() != nodes {
        return Err(Error::Parse("duplicate movie ids in movies.csv".into()));
    }

    let features = read_embeddings(&dir.join("embeddings.csv"))?;
    if features.nrows() != nodes {
        return Err(Error::Shape(format!(
            "embeddings.csv has {} rows but movies.csv has {nodes} movies",
            features.nrows()
        )));
    }

    let edges = read_rating_edges(&dir.join("ratings.csv"), &id_to_node, options.min_shared_ratings)?;
    let adj = Adjacency::from_edges(nodes, &edges)?;

    let split_files = ["train.csv", "validation.csv", "test.csv"].map(|f| dir.join(f));
    let present = split_files.iter().filter(|p| p.exists()).count();
    let (idx_train, idx_val, idx_test) = match present {
        3 => (
            read_split(&split_files[0], &id_to_node)?,
            read_split(&split_files[1], &id_to_node)?,
            read_split(&split_files[2], &id_to_node)?,
        ),
        0 => {
            info!(seed = options.seed, "no split files, using random 60/20/20 split");
            let mut rng = fastrand::Rng::with_seed(options.seed);
            random_split(nodes, &mut rng)
        }
        _ => {
            return Err(Error::Split(
                "need all of train.csv, validation.csv and test.csv or none".into(),
            ))
        }
    };

    GraphData::new(
        adj,
        features,
        movies.labels,
        idx_train,
        idx_val,
        idx_test,
        movies.label_names,
    )
}

struct Movies {
    ids: Vec<String>,
    labels: Array2<f32>,
    label_names: Vec<String>,
}

/// lowercase alphanumerics only, so `Movielens ID`, `movie_id` and `MovieID` match
fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn find_column(headers: &csv::StringRecord, candidates: &[&str], path: &Path) -> Result<usize> {
    let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
    candidates
        .iter()
        .find_map(|c| normalized.iter().position(|h| h == c))
        .ok_or_else(|| Error::MissingColumn {
            column: candidates[0].to_string(),
            file: path.display().to_string(),
        })
}

/// Picks the most frequent of `,` `\t` `;` from the first line, `,` on ties.
/// `|` is left out as it separates genres.
fn sniff_delimiter(path: &Path) -> Result<u8> {
    let mut first = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first)?;
    let sep = [b';', b'\t', b',']
        .into_iter()
        .max_by_key(|&s| first.bytes().filter(|&b| b == s).count())
        .unwrap_or(b',');
    Ok(sep)
}

fn reader(path: &Path, has_headers: bool) -> Result<csv::Reader<File>> {
    let delimiter = sniff_delimiter(path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

fn read_movies(path: &Path) -> Result<Movies> {
    let mut rdr = reader(path, true)?;
    let headers = rdr.headers()?.clone();
    let id_col = find_column(&headers, MOVIE_ID_COLUMNS, path)?;
    let genre_col = find_column(&headers, GENRE_COLUMNS, path)?;

    let mut ids = vec![];
    let mut genres: Vec<Vec<String>> = vec![];
    for record in rdr.records() {
        let record = record?;
        let id = record.get(id_col).unwrap_or_default().to_string();
        let movie_genres = record
            .get(genre_col)
            .unwrap_or_default()
            .split('|')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        ids.push(id);
        genres.push(movie_genres);
    }

    //labels stored alphabetically
    let label_names: Vec<String> = genres
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let column: HashMap<&str, usize> = label_names
        .iter()
        .enumerate()
        .map(|(i, g)| (g.as_str(), i))
        .collect();

    let mut labels = Array2::zeros((ids.len(), label_names.len()));
    for (row, movie_genres) in genres.iter().enumerate() {
        for g in movie_genres {
            labels[[row, column[g.as_str()]]] = 1.;
        }
    }
    debug!(movies = ids.len(), genres = label_names.len(), "read movies");

    Ok(Movies {
        ids,
        labels,
        label_names,
    })
}

fn read_embeddings(path: &Path) -> Result<Array2<f32>> {
    let mut rdr = reader(path, false)?;
    let mut rows: Vec<Vec<f32>> = vec![];
    for record in rdr.records() {
        let record = record?;
        let row = record
            .iter()
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    let cols = rows.first().map_or(0, Vec::len);
    if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
        return Err(Error::Shape(format!(
            "embeddings row {i} has {} values, expected {cols}",
            r.len()
        )));
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Ok(Array2::from_shape_vec((rows.len(), cols), flat)?)
}

fn read_rating_edges(
    path: &Path,
    id_to_node: &HashMap<&str, usize>,
    min_shared_ratings: usize,
) -> Result<Vec<(usize, usize)>> {
    let mut rdr = reader(path, true)?;
    let headers = rdr.headers()?.clone();
    let user_col = find_column(&headers, USER_ID_COLUMNS, path)?;
    let movie_col = find_column(&headers, MOVIE_ID_COLUMNS, path)?;
    let rating_col = find_column(&headers, RATING_COLUMNS, path)?;

    //movies each user gave the same rating
    let mut buckets: HashMap<(String, String), Vec<usize>> = HashMap::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let record = record?;
        let movie = record.get(movie_col).unwrap_or_default();
        let Some(&node) = id_to_node.get(movie) else {
            skipped += 1;
            continue;
        };
        let user = record.get(user_col).unwrap_or_default().to_string();
        let rating = record.get(rating_col).unwrap_or_default().to_string();
        buckets.entry((user, rating)).or_default().push(node);
    }
    if skipped > 0 {
        debug!(skipped, "ratings for unknown movies ignored");
    }

    let mut shared: HashMap<(usize, usize), usize> = HashMap::new();
    for nodes in buckets.values_mut() {
        nodes.sort_unstable();
        nodes.dedup();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in &nodes[i + 1..] {
                *shared.entry((a, b)).or_default() += 1;
            }
        }
    }

    let threshold = min_shared_ratings.max(1);
    let mut edges: Vec<(usize, usize)> = shared
        .into_iter()
        .filter(|&(_, count)| count >= threshold)
        .map(|(pair, _)| pair)
        .collect();
    edges.sort_unstable();
    debug!(edges = edges.len(), threshold, "built rating edges");
    Ok(edges)
}

fn read_split(path: &Path, id_to_node: &HashMap<&str, usize>) -> Result<Vec<usize>> {
    let mut rdr = reader(path, true)?;
    let mut idx = vec![];
    for record in rdr.records() {
        let record = record?;
        let id = record.get(0).unwrap_or_default();
        let node = id_to_node.get(id).ok_or_else(|| {
            Error::Split(format!("unknown movie id `{id}` in {}", path.display()))
        })?;
        idx.push(*node);
    }
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_fixture(dir: &Path, with_splits: bool) {
        let data = dir.join(MOVIELENS_CLASSIFICATION);
        fs::create_dir_all(&data).unwrap();
        fs::write(
            data.join("movies.csv"),
            "MovielensID,Title,Genre\n\
             1,\"Toy Story, The\",Animation|Comedy\n\
             2,Heat,Action|Crime\n\
             3,Casino,Crime|Drama\n\
             4,Babe,Comedy\n",
        )
        .unwrap();
        fs::write(
            data.join("embeddings.csv"),
            "0.1,0.2,0.3\n0.4,0.5,0.6\n0.7,0.8,0.9\n1.0,1.1,1.2\n",
        )
        .unwrap();
        // users 10 and 11 both rate movies 2 and 3 with the same value
        fs::write(
            data.join("ratings.csv"),
            "UserID,MovieID,Rating,Timestamp\n\
             10,2,5,0\n10,3,5,0\n10,1,3,0\n\
             11,2,4,0\n11,3,4,0\n11,4,4,0\n\
             12,1,2,0\n12,99,2,0\n",
        )
        .unwrap();
        if with_splits {
            fs::write(data.join("train.csv"), "MovielensID\n1\n2\n").unwrap();
            fs::write(data.join("validation.csv"), "MovielensID\n3\n").unwrap();
            fs::write(data.join("test.csv"), "MovielensID\n4\n").unwrap();
        }
    }

    #[test]
    fn loads_movielens_fixture() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), true);
        let data = load_data(
            MOVIELENS_CLASSIFICATION,
            tmp.path(),
            &DataOptions::default(),
            Device::Cpu,
        )
        .unwrap();

        assert_eq!(data.nodes(), 4);
        assert_eq!(data.num_features(), 3);
        assert_eq!(
            data.label_names,
            vec!["Action", "Animation", "Comedy", "Crime", "Drama"]
        );
        assert_eq!(data.labels.row(0).to_vec(), vec![0., 1., 1., 0., 0.]);
        assert_eq!(data.labels.row(2).to_vec(), vec![0., 0., 0., 1., 1.]);
        assert_eq!(data.idx_train, vec![0, 1]);
        assert_eq!(data.idx_val, vec![2]);
        assert_eq!(data.idx_test, vec![3]);
        // only movies 2 and 3 share two same-valued ratings
        assert_eq!(data.adj.edge_count(), 1);
        assert!(data.adj.row(1).any(|(c, _)| c == 2));
    }

    #[test]
    fn lower_threshold_adds_edges() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), true);
        let options = DataOptions {
            min_shared_ratings: 1,
            ..DataOptions::default()
        };
        let data = load_data(MOVIELENS_CLASSIFICATION, tmp.path(), &options, Device::Cpu).unwrap();
        // (2,3) twice, (2,4) and (3,4) once
        assert_eq!(data.adj.edge_count(), 3);
    }

    #[test]
    fn random_split_without_files() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), false);
        let data = load_data(
            MOVIELENS_CLASSIFICATION,
            tmp.path(),
            &DataOptions::default(),
            Device::Cpu,
        )
        .unwrap();
        let total = data.idx_train.len() + data.idx_val.len() + data.idx_test.len();
        assert_eq!(total, 4);
    }

    #[test]
    fn missing_genre_column() {
        let tmp = TempDir::new().unwrap();
        write_fixture(tmp.path(), true);
        fs::write(
            tmp.path().join(MOVIELENS_CLASSIFICATION).join("movies.csv"),
            "MovielensID,Title\n1,a\n2,b\n3,c\n4,d\n",
        )
        .unwrap();
        let err = load_data(
            MOVIELENS_CLASSIFICATION,
            tmp.path(),
            &DataOptions::default(),
            Device::Cpu,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }

    #[test]
    fn unknown_dataset() {
        let err = load_data("cora", "data", &DataOptions::default(), Device::Cpu).unwrap_err();
        assert!(matches!(err, Error::UnknownDataset(_)));
    }

    #[test]
    fn overlapping_splits_rejected() {
        let adj = Adjacency::identity(3);
        let err = GraphData::new(
            adj,
            Array2::zeros((3, 2)),
            Array2::zeros((3, 1)),
            vec![0, 1],
            vec![1],
            vec![2],
            vec!["a".into()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Split(_)));
    }

    #[test]
    fn out_of_range_split_rejected() {
        let err = GraphData::new(
            Adjacency::identity(2),
            Array2::zeros((2, 2)),
            Array2::zeros((2, 1)),
            vec![0],
            vec![1],
            vec![2],
            vec!["a".into()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Split(_)));
    }

    #[test]
    fn synthetic_is_deterministic_and_valid() {
        let a = load_data(SYNTHETIC, "", &DataOptions::default(), Device::Cpu).unwrap();
        let b = load_data(SYNTHETIC, "", &DataOptions::default(), Device::Cpu).unwrap();
        assert_eq!(a.features, b.features);
        assert_eq!(a.idx_train, b.idx_train);
        assert_eq!(a.adj, b.adj);

        let mut all: Vec<usize> = a
            .idx_train
            .iter()
            .chain(&a.idx_val)
            .chain(&a.idx_test)
            .copied()
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), a.nodes());
        assert!(all.iter().all(|&i| i < a.nodes()));
    }
}
