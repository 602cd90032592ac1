use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

/// Output of a file based writer.
///
/// Files are only created, truncated or opened for append when the writer
/// is opened, so a writer whose step never runs leaves its file untouched.
pub(crate) enum Destination<W> {
    Writer(W),
    Path {
        path: PathBuf,
        create: fn(&Path) -> io::Result<W>,
    },
}

fn create_file(path: &Path) -> io::Result<File> {
    File::create(path)
}

fn append_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Destination<File> {
    pub(crate) fn file(path: &Path, append: bool) -> Self {
        let create: fn(&Path) -> io::Result<File> = if append {
            append_file
        } else {
            create_file
        };
        Destination::Path {
            path: path.to_path_buf(),
            create,
        }
    }
}

impl<W> Destination<W> {
    /// Resolves the destination, also telling whether it already holds data.
    pub(crate) fn open(self) -> io::Result<(W, bool)> {
        match self {
            Destination::Writer(writer) => Ok((writer, false)),
            Destination::Path { path, create } => {
                let writer = create(&path)?;
                let has_content = fs::metadata(&path)?.len() > 0;
                Ok((writer, has_content))
            }
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Destination::Writer(_) => "writer".to_string(),
            Destination::Path { path, .. } => path.display().to_string(),
        }
    }

    /// Gives back a destination that was never opened.
    pub(crate) fn into_writer(self) -> Option<W> {
        match self {
            Destination::Writer(writer) => Some(writer),
            Destination::Path { .. } => None,
        }
    }
}
