/*!
 * Tests for file utility functions
 */

use std::fs;
use anyhow::Result;
use fisher_subs::file_utils::FileManager;
use fisher_subs::subtitle_format::OutputFormat;
use crate::common;

#[test]
fn test_extension_for_shouldFollowFormat() {
    assert_eq!(FileManager::extension_for(OutputFormat::Srt), "srt");
    assert_eq!(FileManager::extension_for(OutputFormat::Text), "txt");
}

#[test]
fn test_generate_timestamp_shouldUseCompactLocalFormat() {
    let stamp = FileManager::generate_timestamp();

    assert_eq!(stamp.len(), 15);
    assert_eq!(&stamp[8..9], "_");
    assert!(stamp.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
}

#[test]
fn test_unique_output_path_withCollisions_shouldAddCounter() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path().to_path_buf();

    assert_eq!(FileManager::unique_output_path(&dir, "subs", "srt"), dir.join("subs.srt"));

    common::create_test_file(&dir, "subs.srt", "a")?;
    assert_eq!(FileManager::unique_output_path(&dir, "subs", "srt"), dir.join("subs_1.srt"));

    common::create_test_file(&dir, "subs_1.srt", "b")?;
    assert_eq!(FileManager::unique_output_path(&dir, "subs", "srt"), dir.join("subs_2.srt"));
    Ok(())
}

#[test]
fn test_save_subtitles_withNestedDir_shouldCreateDirAndWriteContent() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let output_dir = temp_dir.path().join("nested").join("out");

    let first = FileManager::save_subtitles(&output_dir, "hello", OutputFormat::Text)?;
    let second = FileManager::save_subtitles(&output_dir, "world", OutputFormat::Text)?;

    assert_ne!(first, second);
    assert_eq!(first.extension().and_then(|e| e.to_str()), Some("txt"));
    assert_eq!(fs::read_to_string(&first)?, "hello");
    assert_eq!(fs::read_to_string(&second)?, "world");
    Ok(())
}

#[test]
fn test_save_subtitles_withFileAsOutputDir_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let blocked = common::create_test_file(&temp_dir.path().to_path_buf(), "blocked", "x")?;

    assert!(FileManager::save_subtitles(&blocked, "hello", OutputFormat::Srt).is_err());
    Ok(())
}
