//! Archive-embedded source inputs.
//!
//! An input of the form `archive.zip;inner/file.h5` names a source file
//! inside a zip archive. The member is extracted into a fresh scoped
//! temporary directory ([`ScratchFile`]) that is removed when the value
//! drops, on every exit path, so concurrent conversions never collide on
//! a shared scratch folder.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use snafu::prelude::*;
use tempfile::TempDir;

/// Errors raised while resolving an archive-embedded input.
#[derive(Debug, Snafu)]
pub enum ArchiveError {
    /// The archive itself could not be opened or read.
    #[snafu(display("Cannot open archive {path:?}: {source}"))]
    OpenArchive {
        /// Archive path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The archive is not a readable zip, or the member is absent.
    #[snafu(display("Cannot read {member} from {path:?}: {source}"))]
    ReadMember {
        /// Archive path.
        path: PathBuf,
        /// Member name inside the archive.
        member: String,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },

    /// The scratch copy could not be written.
    #[snafu(display("Cannot write scratch copy of {member}: {source}"))]
    WriteScratch {
        /// Member name inside the archive.
        member: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// A conversion input: a plain path, or a member inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInput {
    /// Path to the source file, or to the archive holding it.
    pub path: PathBuf,
    /// Member name inside the archive, when the input is embedded.
    pub member: Option<String>,
}

impl SourceInput {
    /// Parse `path` or `archive;member` notation.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(';') {
            Some((archive, member)) => SourceInput {
                path: PathBuf::from(archive),
                member: Some(member.to_string()),
            },
            None => SourceInput {
                path: PathBuf::from(raw),
                member: None,
            },
        }
    }

    /// The file stem identifying the dataset (the member's stem for
    /// embedded inputs).
    pub fn stem(&self) -> String {
        let name: &Path = match &self.member {
            Some(member) => Path::new(member),
            None => &self.path,
        };
        name.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A member extracted into its own temporary directory.
///
/// The directory and the copy are deleted when this drops.
#[derive(Debug)]
pub struct ScratchFile {
    dir: TempDir,
    path: PathBuf,
}

impl ScratchFile {
    /// Path of the extracted copy.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// The scratch directory holding the copy.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Extract one member of a zip archive into a fresh scratch directory.
pub fn extract_member(archive: &Path, member: &str) -> Result<ScratchFile, ArchiveError> {
    debug!("extracting {member} from {}", archive.display());
    let file = File::open(archive).context(OpenArchiveSnafu { path: archive })?;
    let mut zip = zip::ZipArchive::new(file).context(ReadMemberSnafu {
        path: archive,
        member,
    })?;
    let mut entry = zip.by_name(member).context(ReadMemberSnafu {
        path: archive,
        member,
    })?;

    let dir = TempDir::new().context(WriteScratchSnafu { member })?;
    // Flatten the member path: only the file name matters in scratch.
    let file_name = Path::new(member)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("member"));
    let path = dir.path().join(file_name);
    let mut out = File::create(&path).context(WriteScratchSnafu { member })?;
    io::copy(&mut entry, &mut out).context(WriteScratchSnafu { member })?;
    Ok(ScratchFile { dir, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with_member(member: &str, contents: &[u8]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = zip::ZipWriter::new(file.reopen().unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file(member, options).unwrap();
        writer.write_all(contents).unwrap();
        writer.finish().unwrap();
        file
    }

    #[test]
    fn parse_splits_on_semicolon() {
        let input = SourceInput::parse("study.zip;points/NACCS_a_b_c_d_e_Peaks.h5");
        assert_eq!(input.path, PathBuf::from("study.zip"));
        assert_eq!(
            input.member.as_deref(),
            Some("points/NACCS_a_b_c_d_e_Peaks.h5")
        );
        assert_eq!(input.stem(), "NACCS_a_b_c_d_e_Peaks");

        let plain = SourceInput::parse("dir/NACCS_a_b_c_d_e_Peaks.h5");
        assert_eq!(plain.member, None);
        assert_eq!(plain.stem(), "NACCS_a_b_c_d_e_Peaks");
    }

    #[test]
    fn extracts_member_and_cleans_up_on_drop() {
        let archive = zip_with_member("inner/data.h5", b"payload");
        let scratch = extract_member(archive.path(), "inner/data.h5").unwrap();
        assert_eq!(std::fs::read(scratch.path()).unwrap(), b"payload");

        let dir = scratch.dir().to_path_buf();
        assert!(dir.exists());
        drop(scratch);
        assert!(!dir.exists());
    }

    #[test]
    fn missing_member_errors_without_leaving_scratch() {
        let archive = zip_with_member("inner/data.h5", b"payload");
        let err = extract_member(archive.path(), "absent.h5").unwrap_err();
        assert!(matches!(err, ArchiveError::ReadMember { .. }));
    }

    #[test]
    fn unreadable_archive_errors() {
        let err = extract_member(Path::new("/no/such/archive.zip"), "x").unwrap_err();
        assert!(matches!(err, ArchiveError::OpenArchive { .. }));
    }
}
