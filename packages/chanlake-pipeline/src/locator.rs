use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::{Error, Result};

/// Finds ingestible artifacts under a root by matching root-relative paths against a glob.
///
/// `*` never crosses a path separator; `**` spans any number of directories. Results are in
/// walk order with siblings sorted by name, so repeated calls over an unchanged tree agree.
#[derive(Debug)]
pub struct FileLocator {
	root: PathBuf,
	matcher: GlobMatcher,
	max_depth: usize,
}
impl FileLocator {
	pub fn new(root: &Path, pattern: &str) -> Result<Self> {
		let glob = GlobBuilder::new(pattern)
			.literal_separator(true)
			.build()
			.map_err(|err| Error::Pattern {
				pattern: pattern.to_string(),
				message: err.to_string(),
			})?;
		let max_depth = if pattern.contains("**") {
			usize::MAX
		} else {
			pattern.split('/').filter(|segment| !segment.is_empty()).count()
		};
		let root = std::path::absolute(root).unwrap_or_else(|err| {
			tracing::warn!(
				error = %err,
				root = %root.display(),
				"Failed to absolutize locator root."
			);

			root.to_path_buf()
		});

		Ok(Self { root, matcher: glob.compile_matcher(), max_depth })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// An empty result is not an error; a missing root simply matches nothing.
	pub fn locate(&self) -> Vec<PathBuf> {
		if !self.root.is_dir() {
			tracing::debug!(root = %self.root.display(), "Locator root does not exist.");

			return Vec::new();
		}

		let mut found = Vec::new();
		let walker = WalkDir::new(&self.root)
			.follow_links(true)
			.max_depth(self.max_depth)
			.sort_by_file_name();

		for entry in walker {
			let entry = match entry {
				Ok(entry) => entry,
				Err(err) => {
					tracing::warn!(error = %err, "Failed to read directory entry; skipping.");

					continue;
				},
			};

			if !entry.file_type().is_file() {
				continue;
			}

			let Ok(relative) = entry.path().strip_prefix(&self.root) else {
				continue;
			};

			if self.matcher.is_match(relative) {
				found.push(entry.into_path());
			}
		}

		tracing::debug!(root = %self.root.display(), count = found.len(), "Located files.");

		found
	}
}
