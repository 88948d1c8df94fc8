use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::args::{LossName, ModelName};
use crate::errors::{FastTextError, Result};
use crate::model::{self, Model};
use crate::predictor::{Predictor, ProbLabel, TestReport};

/// Lifecycle state of a [`ModelStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded,
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => FastTextError::FileNotFound(path.to_path_buf()),
        _ => e.into(),
    })
}

/// Checks the header of the model file at `path`.
///
/// # Errors
///
/// [`FastTextError::FileNotFound`] if `path` does not exist, and
/// [`FastTextError::IncompatibleFormat`] if the header cannot be read.
pub fn check_model_file<P>(path: P) -> Result<i32>
where
    P: AsRef<Path>,
{
    let f = open_file(path.as_ref())?;
    model::check_model(BufReader::new(f))
}

struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

macro_rules! args_getters {
    ( $( $name:ident: $ty:ty => $method:ident; )* ) => {
        $(
            #[doc = concat!("Returns `", stringify!($name), "` of the loaded model.")]
            ///
            /// # Errors
            ///
            /// [`FastTextError::ModelNotLoaded`] if no model is loaded.
            pub fn $name(&self) -> Result<$ty> {
                Ok(self.current()?.model().args().$method())
            }
        )*
    };
}

/// Holder of at most one loaded model.
///
/// Readers work on a snapshot of the current predictor, so a concurrent
/// [`ModelStore::load_model`] or [`ModelStore::unload_model`] never affects a
/// call that has already started.
#[derive(Default)]
pub struct ModelStore {
    predictor: RwLock<Option<Arc<Predictor>>>,
    loading: AtomicUsize,
}

impl ModelStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ModelState {
        if self.loading.load(Ordering::SeqCst) != 0 {
            ModelState::Loading
        } else if self.predictor.read().is_some() {
            ModelState::Loaded
        } else {
            ModelState::Unloaded
        }
    }

    /// Returns the current predictor.
    ///
    /// # Errors
    ///
    /// [`FastTextError::ModelNotLoaded`] if no model is loaded.
    pub fn current(&self) -> Result<Arc<Predictor>> {
        self.predictor
            .read()
            .clone()
            .ok_or(FastTextError::ModelNotLoaded)
    }

    /// Loads the model file at `path`, replacing the current model.
    ///
    /// The file is parsed without holding the lock. On failure the previously
    /// loaded model, if any, is kept.
    ///
    /// # Errors
    ///
    /// [`FastTextError::FileNotFound`] if `path` does not exist,
    /// [`FastTextError::IncompatibleFormat`] if the header is not a supported
    /// model header, and other variants if the file is malformed.
    pub fn load_model<P>(&self, path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let _guard = LoadingGuard::new(&self.loading);
        tracing::debug!(path = %path.display(), "loading model");
        let f = open_file(path)?;
        self.load(BufReader::new(f))
    }

    /// Loads a model from a reader, replacing the current model.
    ///
    /// On failure the previously loaded model, if any, is kept.
    ///
    /// # Errors
    ///
    /// [`FastTextError::IncompatibleFormat`] if the header is not a supported
    /// model header, and other variants if the data is malformed or `rdr`
    /// fails.
    pub fn load_model_from_reader<R>(&self, rdr: R) -> Result<()>
    where
        R: Read,
    {
        let _guard = LoadingGuard::new(&self.loading);
        self.load(rdr)
    }

    fn load<R>(&self, rdr: R) -> Result<()>
    where
        R: Read,
    {
        let predictor = Predictor::new(Model::read(rdr)?)?;
        {
            let model = predictor.model();
            tracing::info!(
                dim = model.args().dim(),
                loss = %model.args().loss(),
                model = %model.args().model(),
                words = model.dictionary().nwords(),
                labels = model.dictionary().nlabels(),
                "model loaded"
            );
        }

        let previous = self.predictor.write().replace(Arc::new(predictor));
        if previous.is_some() {
            tracing::debug!("replaced previously loaded model");
        }
        Ok(())
    }

    /// Drops the current model. Does nothing if no model is loaded.
    pub fn unload_model(&self) {
        if self.predictor.write().take().is_some() {
            tracing::debug!("model unloaded");
        }
    }

    args_getters! {
        dim: usize => dim;
        context_window_size: i32 => context_window_size;
        epoch: i32 => epoch;
        lr: f64 => lr;
        lr_update_rate: i32 => lr_update_rate;
        min_count: i32 => min_count;
        min_count_label: i32 => min_count_label;
        maxn: i32 => maxn;
        minn: i32 => minn;
        word_ngrams: i32 => word_ngrams;
        bucket: i32 => bucket;
        sampling_threshold: f64 => sampling_threshold;
        n_sampled_negatives: i32 => n_sampled_negatives;
        loss_name: LossName => loss;
        model_name: ModelName => model;
    }

    /// Returns the label prefix of the loaded model.
    ///
    /// # Errors
    ///
    /// [`FastTextError::ModelNotLoaded`] if no model is loaded.
    pub fn label_prefix(&self) -> Result<String> {
        Ok(self.current()?.model().args().label_prefix().to_string())
    }

    /// Returns the pretrained vectors file recorded at training time.
    ///
    /// # Errors
    ///
    /// [`FastTextError::ModelNotLoaded`] if no model is loaded.
    pub fn pretrained_vectors_file_name(&self) -> Result<String> {
        Ok(self.current()?.model().args().pretrained_vectors().to_string())
    }

    pub fn n_words(&self) -> Result<usize> {
        Ok(self.current()?.model().dictionary().nwords())
    }

    pub fn n_labels(&self) -> Result<usize> {
        Ok(self.current()?.model().dictionary().nlabels())
    }

    /// Returns the words in id order.
    pub fn words(&self) -> Result<Vec<String>> {
        let predictor = self.current()?;
        let words = predictor.model().dictionary().words();
        Ok(words.map(str::to_string).collect())
    }

    /// Returns the labels in id order.
    pub fn labels(&self) -> Result<Vec<String>> {
        let predictor = self.current()?;
        let labels = predictor.model().dictionary().labels();
        Ok(labels.map(str::to_string).collect())
    }

    /// Predicts the `k` most probable labels of `text`.
    ///
    /// # Errors
    ///
    /// [`FastTextError::ModelNotLoaded`] if no model is loaded, and
    /// [`FastTextError::InvalidArgument`] if `k` is not positive.
    pub fn predict(&self, text: &str, k: i32) -> Result<Vec<String>> {
        self.current()?.predict(text, k)
    }

    /// Predicts the most probable label of `text`.
    ///
    /// `None` is returned when no token of `text` has a vector.
    pub fn predict_best(&self, text: &str) -> Result<Option<String>> {
        self.current()?.predict_best(text)
    }

    /// Predicts the `k` most probable labels of `text` with their
    /// log-probabilities.
    ///
    /// # Errors
    ///
    /// [`FastTextError::ModelNotLoaded`] if no model is loaded, and
    /// [`FastTextError::InvalidArgument`] if `k` is not positive.
    pub fn predict_proba(&self, text: &str, k: i32) -> Result<Vec<ProbLabel>> {
        self.current()?.predict_proba(text, k)
    }

    pub fn predict_proba_best(&self, text: &str) -> Result<Option<ProbLabel>> {
        self.current()?.predict_proba_best(text)
    }

    /// Returns the vector of `word`.
    pub fn get_vector(&self, word: &str) -> Result<Vec<f32>> {
        Ok(self.current()?.word_vector(word))
    }

    pub fn get_sentence_vector(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.current()?.sentence_vector(text))
    }

    /// Evaluates the loaded model on the labelled file at `path`.
    ///
    /// # Errors
    ///
    /// [`FastTextError::ModelNotLoaded`] if no model is loaded,
    /// [`FastTextError::FileNotFound`] if `path` does not exist, and
    /// [`FastTextError::InvalidArgument`] if `k` is not positive.
    pub fn test<P>(&self, path: P, k: i32) -> Result<TestReport>
    where
        P: AsRef<Path>,
    {
        let predictor = self.current()?;
        let f = open_file(path.as_ref())?;
        predictor.test(BufReader::new(f), k)
    }

    /// Same as [`ModelStore::test`] with `k = 1`.
    pub fn test_best<P>(&self, path: P) -> Result<TestReport>
    where
        P: AsRef<Path>,
    {
        self.test(path, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::thread;

    use crate::test_utils::{sports_model, subword_model, write_model};

    #[test]
    fn test_empty_store() {
        let store = ModelStore::new();

        assert_eq!(ModelState::Unloaded, store.state());
        assert_eq!(
            "ModelNotLoadedError: no model is loaded",
            &store.dim().err().unwrap().to_string()
        );
        assert!(matches!(
            store.predict("the team won", 1),
            Err(FastTextError::ModelNotLoaded)
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new();

        let result = store.load_model(dir.path().join("missing.bin"));

        assert!(matches!(result, Err(FastTextError::FileNotFound(_))));
        assert_eq!(ModelState::Unloaded, store.state());
    }

    #[test]
    fn test_load_predict() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(&sports_model(), dir.path(), "sports.bin");
        let store = ModelStore::new();

        store.load_model(&path).unwrap();

        assert_eq!(ModelState::Loaded, store.state());
        assert_eq!(
            Some("__label__sports".to_string()),
            store.predict_best("the team won").unwrap()
        );
        let probs = store.predict_proba("the team won", 2).unwrap();
        let total = probs.iter().map(|p| p.log_prob.exp()).sum::<f32>();
        assert!((total - 1.0).abs() < 1e-4);
        assert_eq!(
            vec!["__label__sports".to_string(), "__label__politics".to_string()],
            store.labels().unwrap()
        );
        assert_eq!(4, store.n_words().unwrap());
        assert_eq!(2, store.n_labels().unwrap());
    }

    #[test]
    fn test_unload_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(&sports_model(), dir.path(), "sports.bin");
        let store = ModelStore::new();

        store.load_model(&path).unwrap();
        let dim = store.dim().unwrap();
        let loss = store.loss_name().unwrap();
        let model = store.model_name().unwrap();
        let prefix = store.label_prefix().unwrap();
        let top = store.predict_proba_best("team won").unwrap();

        store.unload_model();
        assert_eq!(ModelState::Unloaded, store.state());
        assert!(matches!(store.dim(), Err(FastTextError::ModelNotLoaded)));
        assert!(matches!(store.words(), Err(FastTextError::ModelNotLoaded)));
        assert!(matches!(
            store.sampling_threshold(),
            Err(FastTextError::ModelNotLoaded)
        ));

        store.load_model(&path).unwrap();
        assert_eq!(dim, store.dim().unwrap());
        assert_eq!(loss, store.loss_name().unwrap());
        assert_eq!(model, store.model_name().unwrap());
        assert_eq!(prefix, store.label_prefix().unwrap());
        assert_eq!(top, store.predict_proba_best("team won").unwrap());
    }

    #[test]
    fn test_unload_twice() {
        let store = ModelStore::new();

        store.unload_model();
        store.unload_model();

        assert_eq!(ModelState::Unloaded, store.state());
    }

    #[test]
    fn test_bad_header_keeps_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(&sports_model(), dir.path(), "sports.bin");
        let bad = dir.path().join("bad.bin");
        fs::write(&bad, [0u8; 16]).unwrap();
        let store = ModelStore::new();
        store.load_model(&path).unwrap();

        let result = store.load_model(&bad);

        assert!(matches!(result, Err(FastTextError::IncompatibleFormat(_))));
        assert_eq!(ModelState::Loaded, store.state());
        assert_eq!(
            Some("__label__sports".to_string()),
            store.predict_best("the team won").unwrap()
        );
    }

    #[test]
    fn test_load_model_from_reader() {
        let mut buf = vec![];
        sports_model().write(&mut buf).unwrap();
        let store = ModelStore::new();

        store.load_model_from_reader(&buf[..]).unwrap();
        assert_eq!(2, store.dim().unwrap());

        let result = store.load_model_from_reader(&buf[..10]);
        assert!(result.is_err());
        assert_eq!(ModelState::Loaded, store.state());
    }

    #[test]
    fn test_check_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(&sports_model(), dir.path(), "sports.bin");
        let short = dir.path().join("short.bin");
        fs::write(&short, [0x3a]).unwrap();

        assert_eq!(model::FILEFORMAT_VERSION, check_model_file(&path).unwrap());
        assert!(matches!(
            check_model_file(&short),
            Err(FastTextError::IncompatibleFormat(_))
        ));
        assert!(matches!(
            check_model_file(dir.path().join("none.bin")),
            Err(FastTextError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_get_vector() {
        let dir = tempfile::tempdir().unwrap();
        let subword = write_model(&subword_model(), dir.path(), "subword.bin");
        let plain = write_model(&sports_model(), dir.path(), "sports.bin");
        let store = ModelStore::new();

        store.load_model(&subword).unwrap();
        let vec = store.get_vector("unknownword").unwrap();
        assert_eq!(3, vec.len());
        assert!(vec.iter().any(|&x| x != 0.0));

        store.load_model(&plain).unwrap();
        assert_eq!(vec![0.0, 0.0], store.get_vector("unknownword").unwrap());
    }

    #[test]
    fn test_test_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(&sports_model(), dir.path(), "sports.bin");
        let data = dir.path().join("test.txt");
        fs::write(
            &data,
            "__label__sports the team won\n__label__politics vote\n__label__sports vote\n",
        )
        .unwrap();
        let store = ModelStore::new();
        store.load_model(&path).unwrap();

        let report = store.test(&data, 1).unwrap();

        assert_eq!(report, store.test_best(&data).unwrap());
        assert_eq!(1, report.k);
        assert_eq!(3, report.examples);
        assert_eq!(2, report.correct);
        assert_eq!(3, report.gold_labels);
        assert!(matches!(
            store.test(dir.path().join("none.txt"), 1),
            Err(FastTextError::FileNotFound(_))
        ));
        store.unload_model();
        assert!(matches!(
            store.test_best(&data),
            Err(FastTextError::ModelNotLoaded)
        ));
    }

    #[test]
    fn test_concurrent_readers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(&sports_model(), dir.path(), "sports.bin");
        let store = ModelStore::new();
        store.load_model(&path).unwrap();

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let top = store.predict_best("the team won").unwrap();
                        assert_eq!(Some("__label__sports".to_string()), top);
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..10 {
                    store.load_model(&path).unwrap();
                }
            });
        });

        assert_eq!(ModelState::Loaded, store.state());
    }
}
