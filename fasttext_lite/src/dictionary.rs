use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hashbrown::HashMap;

use crate::args::Args;
use crate::errors::{FastTextError, Result};
use crate::utils::{hash_bytes, FastTextHasherBuilder};

/// End-of-sentence token. A newline in the input is read as this token.
pub const EOS: &str = "</s>";

const BOW: &str = "<";
const EOW: &str = ">";

const WORD_NGRAM_MULTIPLIER: u64 = 116049371;

// Upper bound of the entry buffer allocated before entries are read.
const MAX_INITIAL_ENTRIES: usize = 1 << 16;

/// Kind of a dictionary entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryType {
    Word = 0,
    Label = 1,
}

impl EntryType {
    fn from_id(id: i8) -> Result<Self> {
        match id {
            0 => Ok(Self::Word),
            1 => Ok(Self::Label),
            _ => Err(FastTextError::invalid_model(format!(
                "unknown entry type: {id}"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    word: String,
    count: i64,
    entry_type: EntryType,
    // Input rows of the word itself followed by its character n-grams.
    subwords: Vec<usize>,
}

/// Tokens of a line resolved against a [`Dictionary`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Line {
    /// Rows of the input matrix: word ids, subword rows and word n-gram rows.
    pub words: Vec<usize>,

    /// Ids of the known labels found in the line.
    pub labels: Vec<usize>,
}

/// Vocabulary of words and labels.
///
/// Words occupy ids `0..nwords`. Labels have their own id space `0..nlabels`.
/// Character n-grams and word n-grams are hashed into `bucket` slots placed
/// after the words in the input matrix.
pub struct Dictionary {
    entries: Vec<Entry>,
    word2int: HashMap<String, usize, FastTextHasherBuilder>,
    nwords: usize,
    nlabels: usize,
    ntokens: i64,

    // `None` when the model was not pruned.
    pruneidx: Option<HashMap<i32, i32>>,

    minn: usize,
    maxn: usize,
    bucket: usize,
    word_ngrams: usize,
    label_prefix: String,
}

impl Dictionary {
    /// Creates a new dictionary.
    ///
    /// # Arguments
    ///
    /// * `args` - Hyperparameters providing the n-gram settings and the label prefix.
    /// * `words` - Words and their frequencies, in id order.
    /// * `labels` - Labels and their frequencies, in id order.
    ///
    /// # Errors
    ///
    /// If a token is empty or duplicated, or a label does not start with the
    /// label prefix, an error variant will be returned.
    pub fn new<W, L, S, T>(args: &Args, words: W, labels: L) -> Result<Self>
    where
        W: IntoIterator<Item = (S, i64)>,
        L: IntoIterator<Item = (T, i64)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut entries = vec![];
        for (word, count) in words {
            entries.push(Entry {
                word: word.into(),
                count,
                entry_type: EntryType::Word,
                subwords: vec![],
            });
        }
        let nwords = entries.len();
        for (label, count) in labels {
            let label = label.into();
            if !label.starts_with(args.label_prefix()) {
                return Err(FastTextError::invalid_argument(
                    "labels",
                    format!("{label} does not start with {}", args.label_prefix()),
                ));
            }
            entries.push(Entry {
                word: label,
                count,
                entry_type: EntryType::Label,
                subwords: vec![],
            });
        }
        if entries.iter().any(|e| e.word.is_empty()) {
            return Err(FastTextError::invalid_argument(
                "words",
                "contains an empty string",
            ));
        }
        let ntokens = entries.iter().map(|e| e.count).sum();
        Self::from_entries(args, entries, nwords, ntokens, None)
            .map_err(|e| match e {
                FastTextError::InvalidModel(msg) => {
                    FastTextError::invalid_argument("words", msg)
                }
                e => e,
            })
    }

    fn from_entries(
        args: &Args,
        entries: Vec<Entry>,
        nwords: usize,
        ntokens: i64,
        pruneidx: Option<HashMap<i32, i32>>,
    ) -> Result<Self> {
        let mut word2int =
            HashMap::with_capacity_and_hasher(entries.len(), FastTextHasherBuilder);
        for (i, e) in entries.iter().enumerate() {
            if word2int.insert(e.word.clone(), i).is_some() {
                return Err(FastTextError::invalid_model(format!(
                    "duplicated entry: {}",
                    e.word
                )));
            }
        }
        let mut dict = Self {
            nlabels: entries.len() - nwords,
            entries,
            word2int,
            nwords,
            ntokens,
            pruneidx,
            minn: args.minn() as usize,
            maxn: args.maxn() as usize,
            bucket: args.bucket() as usize,
            word_ngrams: args.word_ngrams().max(1) as usize,
            label_prefix: args.label_prefix().to_string(),
        };
        dict.init_ngrams();
        Ok(dict)
    }

    fn init_ngrams(&mut self) {
        for i in 0..self.nwords {
            let mut subwords = vec![i];
            if self.entries[i].word != EOS {
                self.compute_subwords(&self.entries[i].word, &mut subwords);
            }
            self.entries[i].subwords = subwords;
        }
    }

    /// Number of words.
    pub fn nwords(&self) -> usize {
        self.nwords
    }

    /// Number of labels.
    pub fn nlabels(&self) -> usize {
        self.nlabels
    }

    /// Number of tokens in the training corpus.
    pub fn ntokens(&self) -> i64 {
        self.ntokens
    }

    /// Number of hash buckets for n-grams.
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    /// Number of input rows addressed by words and n-grams.
    pub fn input_rows(&self) -> usize {
        match &self.pruneidx {
            None => self.nwords + self.bucket,
            Some(pruneidx) => {
                self.nwords + pruneidx.values().map(|&v| v as usize + 1).max().unwrap_or(0)
            }
        }
    }

    /// Returns the id of a word, or `None` for labels and unknown words.
    pub fn id_of(&self, word: &str) -> Option<usize> {
        self.word2int
            .get(word)
            .copied()
            .filter(|&id| id < self.nwords)
    }

    /// Returns the id of a label in the label space.
    pub fn label_id_of(&self, label: &str) -> Option<usize> {
        self.word2int
            .get(label)
            .copied()
            .filter(|&id| id >= self.nwords)
            .map(|id| id - self.nwords)
    }

    pub fn word(&self, id: usize) -> Option<&str> {
        (id < self.nwords).then(|| self.entries[id].word.as_str())
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.entries
            .get(self.nwords + id)
            .map(|e| e.word.as_str())
    }

    /// Iterates over the words in id order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.entries[..self.nwords].iter().map(|e| e.word.as_str())
    }

    /// Iterates over the labels in id order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries[self.nwords..].iter().map(|e| e.word.as_str())
    }

    /// Iterates over `(entry, count, type)` of every entry, words first.
    pub fn entries(&self) -> impl Iterator<Item = (&str, i64, EntryType)> {
        self.entries
            .iter()
            .map(|e| (e.word.as_str(), e.count, e.entry_type))
    }

    /// Label frequencies in label id order.
    pub fn label_counts(&self) -> Vec<i64> {
        self.entries[self.nwords..].iter().map(|e| e.count).collect()
    }

    /// Returns the bucket ids of the character n-grams of `word`.
    ///
    /// The result is empty when character n-grams are disabled or the word is
    /// too short to produce any n-gram in the configured range.
    pub fn subword_buckets_of(&self, word: &str) -> Vec<usize> {
        let mut rows = vec![];
        if word != EOS {
            self.compute_subwords(word, &mut rows);
        }
        rows.into_iter().map(|row| row - self.nwords).collect()
    }

    /// Returns the input rows that represent `word`.
    ///
    /// A known word yields its own id followed by its n-gram rows. An unknown
    /// word yields its n-gram rows only.
    pub fn subwords_of(&self, word: &str) -> Vec<usize> {
        if let Some(id) = self.id_of(word) {
            return self.entries[id].subwords.clone();
        }
        let mut rows = vec![];
        if word != EOS {
            self.compute_subwords(word, &mut rows);
        }
        rows
    }

    fn compute_subwords(&self, word: &str, rows: &mut Vec<usize>) {
        if self.bucket == 0 || self.maxn == 0 {
            return;
        }
        let padded = format!("{BOW}{word}{EOW}");
        let bytes = padded.as_bytes();
        let mut ngram = Vec::with_capacity(bytes.len());
        for i in 0..bytes.len() {
            if bytes[i] & 0xc0 == 0x80 {
                continue;
            }
            ngram.clear();
            let mut j = i;
            let mut n = 1;
            while j < bytes.len() && n <= self.maxn {
                ngram.push(bytes[j]);
                j += 1;
                while j < bytes.len() && bytes[j] & 0xc0 == 0x80 {
                    ngram.push(bytes[j]);
                    j += 1;
                }
                // A lone BOW or EOW marker is not an n-gram.
                if n >= self.minn && !(n == 1 && (i == 0 || j == bytes.len())) {
                    let h = hash_bytes(&ngram) as usize % self.bucket;
                    self.push_hash(rows, h);
                }
                n += 1;
            }
        }
    }

    fn push_hash(&self, rows: &mut Vec<usize>, id: usize) {
        match &self.pruneidx {
            None => rows.push(self.nwords + id),
            Some(pruneidx) => {
                if let Some(&mapped) = i32::try_from(id).ok().and_then(|id| pruneidx.get(&id)) {
                    rows.push(self.nwords + mapped as usize);
                }
            }
        }
    }

    fn add_word_ngrams(&self, rows: &mut Vec<usize>, hashes: &[u32]) {
        if self.bucket == 0 || self.word_ngrams <= 1 {
            return;
        }
        for i in 0..hashes.len() {
            let mut h = hashes[i] as i32 as i64 as u64;
            for &next in &hashes[i + 1..hashes.len().min(i + self.word_ngrams)] {
                h = h
                    .wrapping_mul(WORD_NGRAM_MULTIPLIER)
                    .wrapping_add(next as i32 as i64 as u64);
                self.push_hash(rows, (h % self.bucket as u64) as usize);
            }
        }
    }

    fn entry_type_of(&self, token: &str) -> EntryType {
        if token.starts_with(&self.label_prefix) {
            EntryType::Label
        } else {
            EntryType::Word
        }
    }

    /// Resolves one line of text.
    ///
    /// Tokens are separated by ASCII whitespace. Reading stops after the first
    /// newline, which contributes the [`EOS`] token.
    pub fn get_line(&self, text: &str) -> Line {
        let mut line = Line::default();
        let mut word_hashes = vec![];
        for token in tokenize(text) {
            let wid = self.word2int.get(token).copied();
            let entry_type = match wid {
                Some(id) => self.entries[id].entry_type,
                None => self.entry_type_of(token),
            };
            match entry_type {
                EntryType::Word => {
                    match wid {
                        Some(id) => line.words.extend_from_slice(&self.entries[id].subwords),
                        None if token != EOS => self.compute_subwords(token, &mut line.words),
                        None => (),
                    }
                    word_hashes.push(hash_bytes(token.as_bytes()));
                }
                EntryType::Label => {
                    if let Some(id) = wid {
                        line.labels.push(id - self.nwords);
                    }
                }
            }
            if token == EOS {
                break;
            }
        }
        self.add_word_ngrams(&mut line.words, &word_hashes);
        line
    }

    pub(crate) fn serialize<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_i32::<LittleEndian>(self.entries.len().try_into()?)?;
        wtr.write_i32::<LittleEndian>(self.nwords.try_into()?)?;
        wtr.write_i32::<LittleEndian>(self.nlabels.try_into()?)?;
        wtr.write_i64::<LittleEndian>(self.ntokens)?;
        match &self.pruneidx {
            None => wtr.write_i64::<LittleEndian>(-1)?,
            Some(pruneidx) => wtr.write_i64::<LittleEndian>(pruneidx.len().try_into()?)?,
        }
        for e in &self.entries {
            wtr.write_all(e.word.as_bytes())?;
            wtr.write_u8(0)?;
            wtr.write_i64::<LittleEndian>(e.count)?;
            wtr.write_i8(e.entry_type as i8)?;
        }
        if let Some(pruneidx) = &self.pruneidx {
            let mut pairs: Vec<_> = pruneidx.iter().collect();
            pairs.sort_unstable();
            for (&from, &to) in pairs {
                wtr.write_i32::<LittleEndian>(from)?;
                wtr.write_i32::<LittleEndian>(to)?;
            }
        }
        Ok(())
    }

    pub(crate) fn deserialize<R>(args: &Args, mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let size = read_count(&mut rdr, "size")?;
        let nwords = read_count(&mut rdr, "nwords")?;
        let nlabels = read_count(&mut rdr, "nlabels")?;
        let ntokens = rdr.read_i64::<LittleEndian>()?;
        let pruneidx_size = rdr.read_i64::<LittleEndian>()?;
        if size != nwords + nlabels {
            return Err(FastTextError::invalid_model(
                "dictionary size does not match nwords + nlabels",
            ));
        }
        let mut entries = Vec::with_capacity(size.min(MAX_INITIAL_ENTRIES));
        for i in 0..size {
            let word = read_cstring(&mut rdr)?;
            let count = rdr.read_i64::<LittleEndian>()?;
            let entry_type = EntryType::from_id(rdr.read_i8()?)?;
            let expected = if i < nwords {
                EntryType::Word
            } else {
                EntryType::Label
            };
            if entry_type != expected {
                return Err(FastTextError::invalid_model(
                    "labels must follow words in the dictionary",
                ));
            }
            entries.push(Entry {
                word,
                count,
                entry_type,
                subwords: vec![],
            });
        }
        let pruneidx = if pruneidx_size < 0 {
            None
        } else {
            let mut pruneidx = HashMap::new();
            for _ in 0..pruneidx_size {
                let from = rdr.read_i32::<LittleEndian>()?;
                let to = rdr.read_i32::<LittleEndian>()?;
                if to < 0 {
                    return Err(FastTextError::invalid_model("negative prune index"));
                }
                pruneidx.insert(from, to);
            }
            Some(pruneidx)
        };
        Self::from_entries(args, entries, nwords, ntokens, pruneidx)
    }
}

fn read_count<R>(mut rdr: R, name: &str) -> Result<usize>
where
    R: Read,
{
    let n = rdr.read_i32::<LittleEndian>()?;
    usize::try_from(n)
        .map_err(|_| FastTextError::invalid_model(format!("negative dictionary {name}")))
}

fn read_cstring<R>(mut rdr: R) -> Result<String>
where
    R: Read,
{
    let mut bytes = vec![];
    loop {
        match rdr.read_u8()? {
            0 => break,
            b => bytes.push(b),
        }
    }
    Ok(String::from_utf8(bytes)?)
}

#[inline]
pub(crate) fn is_delimiter(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\r' | '\t' | '\x0b' | '\x0c' | '\0')
}

/// Splits text into tokens. A newline is emitted as [`EOS`].
pub(crate) fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = vec![];
    let mut start = None;
    for (i, c) in text.char_indices() {
        if is_delimiter(c) {
            if let Some(s) = start.take() {
                tokens.push(&text[s..i]);
            }
            if c == '\n' {
                tokens.push(EOS);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }
    tokens
}
