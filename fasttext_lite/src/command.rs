//! Forwarding of command lines to a command-line driver.

/// Program name placed at index 0 of every argument vector.
pub const PROGRAM_NAME: &str = "fasttext";

/// A command-line driver, such as a trainer.
pub trait TrainingDriver {
    /// Runs the command in `argv` and returns its exit status.
    ///
    /// `argv[0]` is the program name and `argv[1]` the command.
    fn run(&self, argv: &[String]) -> i32;
}

/// Runs a command on `driver`.
///
/// `args` holds the command and its options. The program name is inserted in
/// front of them, and the driver's exit status is returned untouched.
///
/// # Examples
///
/// ```
/// use fasttext_lite::{run, TrainingDriver};
///
/// struct Echo;
///
/// impl TrainingDriver for Echo {
///     fn run(&self, argv: &[String]) -> i32 {
///         argv.len() as i32
///     }
/// }
///
/// assert_eq!(3, run(&Echo, ["test", "model.bin"]));
/// ```
pub fn run<D, I, S>(driver: &D, args: I) -> i32
where
    D: TrainingDriver + ?Sized,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = std::iter::once(PROGRAM_NAME.to_string())
        .chain(args.into_iter().map(Into::into))
        .collect();
    tracing::debug!(command = argv.get(1).map(String::as_str), "running command");
    driver.run(&argv)
}
