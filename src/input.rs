use crate::error::{AppError, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use url::Url;

/// How to read the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InputDatatype {
    /// Decide from the first line of the file.
    #[default]
    Auto,
    /// One URL per line, all downloaded to `--output`.
    Txt,
    /// `output_dir,url` rows.
    Csv,
}

/// URLs to process for one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub output_dir: PathBuf,
    pub urls: Vec<String>,
}

/// Everything to download, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputPlan {
    pub targets: Vec<Target>,
}

impl InputPlan {
    pub fn single(output_dir: &Path, urls: Vec<String>) -> Self {
        Self {
            targets: vec![Target {
                output_dir: output_dir.to_path_buf(),
                urls,
            }],
        }
    }

    pub fn url_count(&self) -> usize {
        self.targets.iter().map(|t| t.urls.len()).sum()
    }

    pub fn output_dirs(&self) -> impl Iterator<Item = &Path> {
        self.targets.iter().map(|t| t.output_dir.as_path())
    }

    fn push(&mut self, output_dir: PathBuf, url: String) {
        match self.targets.iter_mut().find(|t| t.output_dir == output_dir) {
            Some(target) => target.urls.push(url),
            None => self.targets.push(Target {
                output_dir,
                urls: vec![url],
            }),
        }
    }
}

/// Whether `candidate` is an absolute http(s) or ftp(s) URL with a host.
pub fn is_url(candidate: &str) -> bool {
    match Url::parse(candidate.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https" | "ftp" | "ftps") && url.host().is_some()
        }
        Err(_) => false,
    }
}

/// Turns the positional argument into an [`InputPlan`].
///
/// # Arguments
/// * `file` - A URL, or the path of a text or CSV file
/// * `datatype` - Forced file type, or `Auto`
/// * `output` - Target directory for URLs and text files
///
/// # Errors
/// Returns error if:
/// - The input file does not exist or cannot be read
/// - The file type cannot be determined
/// - `output` is missing for a URL or a text file
/// - Any line is not a URL
pub fn resolve_input(
    file: &str,
    datatype: InputDatatype,
    output: Option<&Path>,
) -> Result<InputPlan> {
    if datatype == InputDatatype::Auto && is_url(file) {
        let output = output.ok_or_else(|| {
            AppError::Config(
                "You must specify an output path with --output when the input is a URL.".into(),
            )
        })?;
        return Ok(InputPlan::single(output, vec![file.trim().to_string()]));
    }

    let path = Path::new(file);
    if !path.exists() {
        return Err(AppError::Config(format!(
            "Input file does not exist: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    parse_input(&content, datatype, output)
}

/// Parses the content of an input file.
pub fn parse_input(
    content: &str,
    datatype: InputDatatype,
    output: Option<&Path>,
) -> Result<InputPlan> {
    let datatype = match datatype {
        InputDatatype::Auto => detect(content)?,
        forced => forced,
    };

    let plan = match datatype {
        InputDatatype::Csv => parse_csv(content)?,
        _ => {
            let output = output.ok_or_else(|| {
                AppError::Config(
                    "You must specify an output path with --output when the input datatype is a text file."
                        .into(),
                )
            })?;
            let urls = content_lines(content).map(str::to_string).collect();
            InputPlan::single(output, urls)
        }
    };

    for url in plan.targets.iter().flat_map(|t| t.urls.iter()) {
        if !is_url(url) {
            return Err(AppError::Config(format!("Not a url: {}", url)));
        }
    }

    Ok(plan)
}

/// Trimmed lines that are neither blank nor `#` comments.
fn content_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn detect(content: &str) -> Result<InputDatatype> {
    let first = content_lines(content)
        .next()
        .ok_or_else(|| AppError::Input("Input file is empty".into()))?;

    if is_url(first) {
        Ok(InputDatatype::Txt)
    } else if first.contains(',') {
        Ok(InputDatatype::Csv)
    } else {
        Err(AppError::Input(format!("Unknown file type: {}", first)))
    }
}

fn parse_csv(content: &str) -> Result<InputPlan> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(content.as_bytes());

    let mut plan = InputPlan::default();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        match (record.get(0), record.get(1)) {
            (Some(dir), Some(url)) if !dir.is_empty() && !url.is_empty() => {
                plan.push(PathBuf::from(dir), url.to_string());
            }
            _ => {
                return Err(AppError::Input(format!(
                    "Expected 'output_dir,url' on row {}",
                    row + 1
                )));
            }
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://www.youtube.com/playlist?list=PL123"));
        assert!(is_url("http://localhost:8080/v"));
        assert!(is_url("ftp://10.0.0.1/file"));
        assert!(!is_url("youtube.com/watch?v=1"));
        assert!(!is_url("file:///etc/passwd"));
        assert!(!is_url("/home/me/list.txt"));
        assert!(!is_url("music,https://youtube.com"));
    }

    #[test]
    fn test_url_requires_output() {
        let err = resolve_input("https://youtube.com/watch?v=1", InputDatatype::Auto, None);
        assert!(matches!(err, Err(AppError::Config(_))));

        let plan = resolve_input(
            "https://youtube.com/watch?v=1",
            InputDatatype::Auto,
            Some(Path::new("/out")),
        )
        .unwrap();
        assert_eq!(plan, InputPlan::single(Path::new("/out"), vec!["https://youtube.com/watch?v=1".into()]));
    }

    #[test]
    fn test_text_file_auto_detected() {
        let content = "https://youtube.com/playlist?list=A\n\n  https://youtube.com/watch?v=B  \n";

        let plan = parse_input(content, InputDatatype::Auto, Some(Path::new("/out"))).unwrap();

        assert_eq!(plan.url_count(), 2);
        assert_eq!(plan.targets[0].urls[1], "https://youtube.com/watch?v=B");
    }

    #[test]
    fn test_csv_groups_by_directory_in_order() {
        let content = "# music first\nmusic, https://youtube.com/playlist?list=M1\ntalks,https://youtube.com/playlist?list=T1\nmusic,https://youtube.com/playlist?list=M2\n";

        let plan = parse_input(content, InputDatatype::Auto, None).unwrap();

        assert_eq!(plan.targets.len(), 2);
        assert_eq!(plan.targets[0].output_dir, PathBuf::from("music"));
        assert_eq!(plan.targets[0].urls.len(), 2);
        assert_eq!(plan.targets[1].output_dir, PathBuf::from("talks"));
        assert_eq!(plan.output_dirs().count(), 2);
    }

    #[test]
    fn test_bad_line_is_rejected() {
        let content = "https://youtube.com/watch?v=1\nnot a url\n";

        let err = parse_input(content, InputDatatype::Txt, Some(Path::new("/out")));

        match err {
            Err(AppError::Config(msg)) => assert_eq!(msg, "Not a url: not a url"),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_leading_comments_are_skipped() {
        let csv = "# where things go\n\n# more notes\nmusic,https://youtube.com/playlist?list=M1\n";
        let plan = parse_input(csv, InputDatatype::Auto, None).unwrap();
        assert_eq!(plan.targets[0].output_dir, PathBuf::from("music"));

        let txt = "# my playlists\nhttps://youtube.com/playlist?list=A\n# disabled\n";
        let plan = parse_input(txt, InputDatatype::Auto, Some(Path::new("/out"))).unwrap();
        assert_eq!(plan.targets[0].urls, vec!["https://youtube.com/playlist?list=A"]);
    }

    #[test]
    fn test_only_comments_is_empty_input() {
        let err = parse_input("# nothing yet\n", InputDatatype::Auto, None);
        assert!(matches!(err, Err(AppError::Input(_))));
    }

    #[test]
    fn test_unknown_file_type() {
        let err = parse_input("hello world\n", InputDatatype::Auto, Some(Path::new("/out")));
        assert!(matches!(err, Err(AppError::Input(_))));
    }

    #[test]
    fn test_csv_row_without_url() {
        let err = parse_input("music\n", InputDatatype::Csv, None);
        assert!(matches!(err, Err(AppError::Input(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.txt");

        let err = resolve_input(missing.to_str().unwrap(), InputDatatype::Auto, None);
        assert!(matches!(err, Err(AppError::Config(_))));
    }

    #[test]
    fn test_forced_txt_reads_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("urls.txt");
        std::fs::write(&file, "https://youtube.com/watch?v=1\n").unwrap();

        let plan = resolve_input(file.to_str().unwrap(), InputDatatype::Txt, Some(dir.path())).unwrap();
        assert_eq!(plan.url_count(), 1);
    }
}
