use std::fs::File;
use std::io::{prelude::*, stdin, stdout, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use fasttext_lite::{EntryType, ModelStore, Predictor, TrainingDriver};
use tracing_subscriber::EnvFilter;

const TRAINING_COMMANDS: &[&str] = &["supervised", "skipgram", "cbow", "quantize"];

#[derive(Parser, Debug)]
#[command(name = "fasttext", about = "A program to query fastText models.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluates a supervised model on labelled text
    Test {
        /// The model file, optionally compressed with zstd (`.zst`)
        model: PathBuf,

        /// Labelled text, or `-` for stdin
        test_data: PathBuf,

        /// Number of labels predicted per line
        #[arg(default_value_t = 1)]
        k: i32,
    },

    /// Prints the most likely labels of each line
    Predict {
        /// The model file, optionally compressed with zstd (`.zst`)
        model: PathBuf,

        /// Input text, or `-` for stdin
        test_data: PathBuf,

        /// Number of labels predicted per line
        #[arg(default_value_t = 1)]
        k: i32,

        /// Minimum probability of a printed label
        #[arg(default_value_t = 0.0)]
        threshold: f32,
    },

    /// Prints the most likely labels of each line with their probabilities
    PredictProb {
        /// The model file, optionally compressed with zstd (`.zst`)
        model: PathBuf,

        /// Input text, or `-` for stdin
        test_data: PathBuf,

        /// Number of labels predicted per line
        #[arg(default_value_t = 1)]
        k: i32,

        /// Minimum probability of a printed label
        #[arg(default_value_t = 0.0)]
        threshold: f32,
    },

    /// Prints the vectors of the words read from stdin
    PrintWordVectors {
        /// The model file, optionally compressed with zstd (`.zst`)
        model: PathBuf,
    },

    /// Prints the vectors of the lines read from stdin
    PrintSentenceVectors {
        /// The model file, optionally compressed with zstd (`.zst`)
        model: PathBuf,
    },

    /// Prints a part of a model
    Dump {
        /// The model file, optionally compressed with zstd (`.zst`)
        model: PathBuf,

        /// The part to print
        #[arg(value_enum)]
        option: DumpOption,
    },

    #[command(external_subcommand)]
    External(Vec<String>),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DumpOption {
    Args,
    Dict,
    Input,
    Output,
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>, Box<dyn std::error::Error>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(stdin())))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

fn load(model: &Path) -> Result<Arc<Predictor>, Box<dyn std::error::Error>> {
    eprintln!("Loading model file...");
    let start = Instant::now();
    let store = ModelStore::new();
    if model.extension().map_or(false, |ext| ext == "zst") {
        store.load_model_from_reader(zstd::Decoder::new(File::open(model)?)?)?;
    } else {
        store.load_model(model)?;
    }
    eprintln!("Elapsed: {} [sec]", start.elapsed().as_secs_f64());
    Ok(store.current()?)
}

fn write_vector<W>(out: &mut W, head: &str, vec: &[f32]) -> std::io::Result<()>
where
    W: Write,
{
    write!(out, "{head}")?;
    for x in vec {
        write!(out, " {x}")?;
    }
    writeln!(out)
}

fn predict(
    model: &Path,
    test_data: &Path,
    k: i32,
    threshold: f32,
    with_prob: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let predictor = load(model)?;
    let mut out = BufWriter::new(stdout().lock());
    for line in open_input(test_data)?.lines() {
        let preds = predictor.predict_proba_with_threshold(&line?, k, threshold)?;
        let fields: Vec<String> = preds
            .into_iter()
            .map(|p| {
                if with_prob {
                    format!("{} {}", p.label, p.log_prob.exp())
                } else {
                    p.label
                }
            })
            .collect();
        writeln!(out, "{}", fields.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

fn dump(model: &Path, option: DumpOption) -> Result<(), Box<dyn std::error::Error>> {
    let predictor = load(model)?;
    let model = predictor.model();
    let mut out = BufWriter::new(stdout().lock());
    match option {
        DumpOption::Args => {
            let args = model.args();
            writeln!(out, "dim {}", args.dim())?;
            writeln!(out, "ws {}", args.context_window_size())?;
            writeln!(out, "epoch {}", args.epoch())?;
            writeln!(out, "minCount {}", args.min_count())?;
            writeln!(out, "neg {}", args.n_sampled_negatives())?;
            writeln!(out, "wordNgrams {}", args.word_ngrams())?;
            writeln!(out, "loss {}", args.loss())?;
            writeln!(out, "model {}", args.model())?;
            writeln!(out, "bucket {}", args.bucket())?;
            writeln!(out, "minn {}", args.minn())?;
            writeln!(out, "maxn {}", args.maxn())?;
            writeln!(out, "lrUpdateRate {}", args.lr_update_rate())?;
            writeln!(out, "t {}", args.sampling_threshold())?;
        }
        DumpOption::Dict => {
            let dict = model.dictionary();
            writeln!(out, "{}", dict.nwords() + dict.nlabels())?;
            for (entry, count, entry_type) in dict.entries() {
                let entry_type = match entry_type {
                    EntryType::Word => "word",
                    EntryType::Label => "label",
                };
                writeln!(out, "{entry} {count} {entry_type}")?;
            }
        }
        DumpOption::Input | DumpOption::Output => {
            let matrix = if matches!(option, DumpOption::Input) {
                model.table().input()
            } else {
                model.table().output()
            };
            writeln!(out, "{} {}", matrix.rows(), matrix.cols())?;
            for i in 0..matrix.rows() {
                if let Some(row) = matrix.row(i) {
                    let row: Vec<String> = row.iter().map(f32::to_string).collect();
                    writeln!(out, "{}", row.join(" "))?;
                }
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn execute(command: Command) -> Result<i32, Box<dyn std::error::Error>> {
    match command {
        Command::Test {
            model,
            test_data,
            k,
        } => {
            let predictor = load(&model)?;
            let report = predictor.test(open_input(&test_data)?, k)?;
            println!("{report}");
        }
        Command::Predict {
            model,
            test_data,
            k,
            threshold,
        } => predict(&model, &test_data, k, threshold, false)?,
        Command::PredictProb {
            model,
            test_data,
            k,
            threshold,
        } => predict(&model, &test_data, k, threshold, true)?,
        Command::PrintWordVectors { model } => {
            let predictor = load(&model)?;
            let mut out = BufWriter::new(stdout().lock());
            for line in stdin().lock().lines() {
                for word in line?.split_ascii_whitespace() {
                    write_vector(&mut out, word, &predictor.word_vector(word))?;
                }
            }
            out.flush()?;
        }
        Command::PrintSentenceVectors { model } => {
            let predictor = load(&model)?;
            let mut out = BufWriter::new(stdout().lock());
            for line in stdin().lock().lines() {
                let vec = predictor.sentence_vector(&line?);
                let vec: Vec<String> = vec.iter().map(f32::to_string).collect();
                writeln!(out, "{}", vec.join(" "))?;
            }
            out.flush()?;
        }
        Command::Dump { model, option } => dump(&model, option)?,
        Command::External(args) => {
            let name = args.first().map(String::as_str).unwrap_or_default();
            if TRAINING_COMMANDS.contains(&name) {
                eprintln!("{name}: training is not supported, use the fastText trainer");
            } else {
                eprintln!("{name}: unknown command");
            }
            return Ok(1);
        }
    }
    Ok(0)
}

/// Command-line driver serving the query commands.
struct CliDriver;

impl TrainingDriver for CliDriver {
    fn run(&self, argv: &[String]) -> i32 {
        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(e) => {
                let _ = e.print();
                return e.exit_code();
            }
        };
        match execute(cli.command) {
            Ok(status) => status,
            Err(e) => {
                eprintln!("{e}");
                1
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(fasttext_lite::run(&CliDriver, std::env::args().skip(1)));
}
