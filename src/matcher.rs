// Tag-based image selection.
use rand::Rng;

use crate::content::{ImageEntry, TagSelection};
use crate::error::SelectionError;

/// Number of selected categories whose tag the image carries. Empty selections never match.
pub fn score(image: &ImageEntry, selected: &TagSelection) -> usize {
    selected
        .iter()
        .filter(|(_, tag)| !tag.is_empty())
        .filter(|(category, tag)| {
            image
                .tags
                .get(category.as_str())
                .is_some_and(|value| value.matches(tag))
        })
        .count()
}

/// Picks uniformly at random among the highest-scoring images.
///
/// When nothing matches, every image ties at zero and the whole catalog is the tie set.
pub fn select_best<'a, R>(
    images: &'a [ImageEntry],
    selected: &TagSelection,
    rng: &mut R,
) -> Result<&'a ImageEntry, SelectionError>
where
    R: Rng + ?Sized,
{
    let scores: Vec<usize> = images.iter().map(|image| score(image, selected)).collect();
    let max_score = scores
        .iter()
        .copied()
        .max()
        .ok_or(SelectionError::NoCandidates)?;

    let best: Vec<&ImageEntry> = images
        .iter()
        .zip(&scores)
        .filter(|(_, score)| **score == max_score)
        .map(|(image, _)| image)
        .collect();

    let chosen = best[rng.random_range(0..best.len())];
    log::info!(
        "[Image Selection] Selected image with {} matching tags: {}",
        max_score,
        chosen.url
    );
    Ok(chosen)
}
