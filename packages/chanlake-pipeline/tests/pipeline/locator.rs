use chanlake_pipeline::{Error, FileLocator};

use super::write_file;

#[test]
fn finds_batches_across_dates_and_channels() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");

	write_file(root.path(), "2024-01-01/Chemed/Chemed_100.json", b"[]");
	write_file(root.path(), "2024-01-01/tikvahpharma/tikvahpharma_100.json", b"[]");
	write_file(root.path(), "2024-01-02/Chemed/Chemed_100.json", b"[]");
	write_file(root.path(), "2024-01-01/Chemed/images/555.jpg", b"jpeg");
	write_file(root.path(), "2024-01-01/Chemed/notes.txt", b"ignored");
	write_file(root.path(), "stray.json", b"[]");

	let locator = FileLocator::new(root.path(), "*/*/*.json").expect("Pattern must compile.");
	let found = locator.locate();
	let relative: Vec<String> = found
		.iter()
		.map(|path| {
			assert!(path.is_absolute(), "Located paths must be absolute: {}", path.display());

			path.strip_prefix(locator.root())
				.expect("Located path must sit under the root.")
				.to_string_lossy()
				.into_owned()
		})
		.collect();

	assert_eq!(
		relative,
		vec![
			"2024-01-01/Chemed/Chemed_100.json".to_string(),
			"2024-01-01/tikvahpharma/tikvahpharma_100.json".to_string(),
			"2024-01-02/Chemed/Chemed_100.json".to_string(),
		]
	);
}

#[test]
fn image_pattern_only_matches_images_directory() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");

	write_file(root.path(), "2024-01-01/ChannelX/images/555.jpg", b"jpeg");
	write_file(root.path(), "2024-01-01/ChannelX/images/556.png", b"png");
	write_file(root.path(), "2024-01-01/ChannelX/557.jpg", b"jpeg");

	let found =
		FileLocator::new(root.path(), "*/*/images/*.jpg").expect("Pattern must compile.").locate();

	assert_eq!(found.len(), 1);
	assert!(found[0].ends_with("2024-01-01/ChannelX/images/555.jpg"));
}

#[test]
fn recursive_wildcard_reaches_any_depth() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");

	write_file(root.path(), "2024-01-01/Chemed/images/1.jpg", b"jpeg");
	write_file(root.path(), "archive/2023/12/31/Chemed/images/2.jpg", b"jpeg");

	let found = FileLocator::new(root.path(), "**/images/*.jpg").expect("Pattern must compile.").locate();

	assert_eq!(found.len(), 2);
}

#[test]
fn repeated_scans_return_the_same_sequence() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");

	for channel in ["b_channel", "a_channel", "c_channel"] {
		write_file(root.path(), &format!("2024-01-01/{channel}/batch.json"), b"[]");
	}

	let locator = FileLocator::new(root.path(), "*/*/*.json").expect("Pattern must compile.");
	let first = locator.locate();
	let second = locator.locate();

	assert_eq!(first.len(), 3);
	assert_eq!(first, second);
}

#[test]
fn no_match_is_an_empty_sequence() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");

	write_file(root.path(), "2024-01-01/Chemed/readme.md", b"nothing to load");

	let found = FileLocator::new(root.path(), "*/*/*.json").expect("Pattern must compile.").locate();

	assert!(found.is_empty());
}

#[test]
fn missing_root_is_an_empty_sequence() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let missing = root.path().join("never-scraped");
	let found = FileLocator::new(&missing, "*/*/*.json").expect("Pattern must compile.").locate();

	assert!(found.is_empty());
}

#[test]
fn rejects_malformed_pattern() {
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let err = FileLocator::new(root.path(), "*/[unclosed/*.json").expect_err("Pattern must be rejected.");

	assert!(matches!(err, Error::Pattern { .. }), "Unexpected error: {err}");
}
