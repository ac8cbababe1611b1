//! Place label to channel id normalization.

use crate::types::ChannelId;

/// Turn a free-text place name into its canonical channel id.
///
/// Every whitespace character is removed and the rest is lowercased, so
/// `"  San Francisco "` and `"sanfrancisco"` name the same channel. Input
/// with nothing but whitespace yields the empty sentinel id.
pub fn normalize(raw: &str) -> ChannelId {
    let id = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    ChannelId(id)
}
