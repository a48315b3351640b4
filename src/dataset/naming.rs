//! File and identifier naming conventions of the keyframe dataset.
//!
//! Keyframes are numbered from 1. Every component that turns a keyframe
//! index into a file name or identifier goes through these functions.

/// File name of the keyframe image, e.g. `007.jpg`.
pub fn keyframe_file_name(keyframe_idx: usize) -> String {
    format!("{:03}.jpg", keyframe_idx)
}

/// Identity of a keyframe record, e.g. `L21_V001_007`.
pub fn record_id(video_id: &str, keyframe_idx: usize) -> String {
    format!("{}_{:03}", video_id, keyframe_idx)
}

/// Batch label of a video: everything before the first `_` (`L21` for `L21_V001`).
///
/// Ids without a separator are their own batch.
pub fn batch_label(video_id: &str) -> &str {
    video_id
        .split_once('_')
        .map(|(batch, _)| batch)
        .unwrap_or(video_id)
}

/// Keyframe image directory of a video, relative to the data root.
pub fn keyframes_dir(pattern: &str, video_id: &str) -> String {
    format!(
        "{}/{}",
        pattern.replace("{batch}", batch_label(video_id)),
        video_id
    )
}

/// Image path persisted in the payload, relative to the data root.
pub fn jpg_path(pattern: &str, video_id: &str, keyframe_idx: usize) -> String {
    format!(
        "{}/{}",
        keyframes_dir(pattern, video_id),
        keyframe_file_name(keyframe_idx)
    )
}

/// Detection file names to try for a keyframe, in order of preference.
///
/// The detector wrote 4-digit names for most videos and 3-digit names for some.
pub fn detection_file_candidates(keyframe_idx: usize) -> [String; 2] {
    [
        format!("{:04}.json", keyframe_idx),
        format!("{:03}.json", keyframe_idx),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_zero_padded() {
        assert_eq!(record_id("L21_V001", 1), "L21_V001_001");
        assert_eq!(record_id("L21_V001", 307), "L21_V001_307");
        assert_eq!(record_id("L21_V001", 1234), "L21_V001_1234");
    }

    #[test]
    fn test_batch_label() {
        assert_eq!(batch_label("L21_V001"), "L21");
        assert_eq!(batch_label("K03_V120_extra"), "K03");
        assert_eq!(batch_label("standalone"), "standalone");
    }

    #[test]
    fn test_jpg_path() {
        assert_eq!(
            jpg_path("Keyframes_{batch}/keyframes", "L21_V001", 12),
            "Keyframes_L21/keyframes/L21_V001/012.jpg"
        );
    }

    #[test]
    fn test_detection_candidates_prefer_four_digits() {
        assert_eq!(detection_file_candidates(37), ["0037.json", "037.json"]);
    }
}
