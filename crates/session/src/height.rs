//! Session height arithmetic
//!
//! Sessions start on heights `1, 1 + bps, 1 + 2*bps, ...` where `bps` is
//! the blocks-per-session parameter.

/// Start height of the session containing `current`.
///
/// Returns 0 before the first block.
pub fn latest_session_block_height(current: u64, blocks_per_session: u64) -> u64 {
    let bps = blocks_per_session.max(1);
    if current == 0 {
        return 0;
    }
    if current % bps == 0 {
        current - bps + 1
    } else {
        (current / bps) * bps + 1
    }
}

/// True if a session starts at `height`
pub fn is_session_block(height: u64, blocks_per_session: u64) -> bool {
    let bps = blocks_per_session.max(1);
    height >= 1 && (height - 1) % bps == 0
}

/// True if `height` is one of the last `allowance` session starts up to `latest`
pub fn is_within_tolerance(height: u64, latest: u64, allowance: u64, blocks_per_session: u64) -> bool {
    let floor = latest.saturating_sub(allowance.saturating_mul(blocks_per_session.max(1)));
    height > 0 && height >= floor && height <= latest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_session_height_mid_session() {
        assert_eq!(latest_session_block_height(1, 4), 1);
        assert_eq!(latest_session_block_height(3, 4), 1);
        assert_eq!(latest_session_block_height(5, 4), 5);
        assert_eq!(latest_session_block_height(7, 4), 5);
    }

    #[test]
    fn test_latest_session_height_on_boundary() {
        // The last block of a session still belongs to it
        assert_eq!(latest_session_block_height(4, 4), 1);
        assert_eq!(latest_session_block_height(8, 4), 5);
    }

    #[test]
    fn test_latest_session_height_single_block_sessions() {
        assert_eq!(latest_session_block_height(9, 1), 9);
        assert_eq!(latest_session_block_height(9, 0), 9);
        assert_eq!(latest_session_block_height(0, 4), 0);
    }

    #[test]
    fn test_is_session_block() {
        assert!(is_session_block(1, 4));
        assert!(is_session_block(5, 4));
        assert!(!is_session_block(4, 4));
        assert!(!is_session_block(0, 4));
        assert!(is_session_block(3, 1));
    }

    #[test]
    fn test_tolerance_window() {
        // latest 9, bps 4, allowance 1 => [5, 9]
        assert!(is_within_tolerance(9, 9, 1, 4));
        assert!(is_within_tolerance(5, 9, 1, 4));
        assert!(!is_within_tolerance(1, 9, 1, 4));
        assert!(!is_within_tolerance(13, 9, 1, 4));
        assert!(!is_within_tolerance(0, 9, 5, 4));
    }

    #[test]
    fn test_zero_allowance_only_latest() {
        assert!(is_within_tolerance(9, 9, 0, 4));
        assert!(!is_within_tolerance(5, 9, 0, 4));
    }
}
