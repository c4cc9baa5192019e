use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::artifacts::GZIP_SUFFIX;
use crate::errors::DatasetError;
use crate::transport::{ByteReader, ByteSource, ContentEncoding};

/// Repeatable source backed by a file on disk.
///
/// Files whose name ends in `.gz` are treated as gzip-compressed.
#[derive(Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    content_type: String,
    encoding: ContentEncoding,
}

impl FileSource {
    /// Create a source for `path`, inferring compression from its suffix.
    pub fn new(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        let path = path.into();
        let gzipped = is_gzip_path(&path);
        Self::with_encoding(path, content_type, gzipped)
    }

    /// Create a source for `path` with explicit storage compression.
    pub fn with_encoding(
        path: impl Into<PathBuf>,
        content_type: impl Into<String>,
        source_gzipped: bool,
    ) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            path,
            name,
            content_type: content_type.into(),
            encoding: ContentEncoding::for_source(Some(source_gzipped)),
        }
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    fn encoding_mut(&mut self) -> &mut ContentEncoding {
        &mut self.encoding
    }

    fn materialize(&mut self) -> Result<(), DatasetError> {
        Ok(())
    }

    fn can_read_multiple_times(&self) -> bool {
        true
    }

    fn try_clone(&self) -> Option<Box<dyn ByteSource>> {
        Some(Box::new(self.clone()))
    }

    fn open_raw(&mut self) -> Result<ByteReader, DatasetError> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// True if the path ends in `.gz` (case-insensitive).
pub fn is_gzip_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_ascii_lowercase().ends_with(GZIP_SUFFIX))
        .unwrap_or(false)
}

/// Copy a source into `dir` and return a repeatable file source over the copy.
///
/// The file is named `<base_name>.<source name>` (or the source name when no
/// base is given), with `.gz` appended when the content is gzip-encoded.
pub fn write_to_dir(
    source: &mut dyn ByteSource,
    dir: &Path,
    base_name: Option<&str>,
) -> Result<FileSource, DatasetError> {
    let gzip = source.gzip_content();
    let mut file_name = match base_name {
        Some(base) => format!("{base}.{}", source.name()),
        None => source.name().to_string(),
    };
    if gzip {
        file_name.push_str(GZIP_SUFFIX);
    }
    let target = dir.join(&file_name);
    debug!(source = source.name(), path = %target.display(), "writing byte source to file");

    fs::create_dir_all(dir)?;
    let mut reader = source.open()?;
    let mut file = File::create(&target)?;
    io::copy(&mut reader, &mut file)?;

    let mut written = FileSource::with_encoding(target, source.content_type(), gzip);
    written.set_name(source.name());
    Ok(written)
}
