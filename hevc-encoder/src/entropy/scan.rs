//! Coefficient scan orders.

/// Up-right diagonal scan of a `width` x `height` block as `(x, y)` pairs.
pub fn diagonal_scan(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut order = Vec::with_capacity((width * height) as usize);
    for diagonal in 0..(width + height).saturating_sub(1) {
        for x in 0..=diagonal {
            let y = diagonal - x;
            if x < width && y < height {
                order.push((x, y));
            }
        }
    }
    order
}

/// Scan in 4x4 sub-blocks: sub-blocks diagonally, positions diagonally inside.
///
/// Position `n` of the result lies in sub-block `n / 16`.
pub fn subblock_scan(width: u32, height: u32) -> Vec<(u32, u32)> {
    let inner = diagonal_scan(4, 4);
    diagonal_scan(width / 4, height / 4)
        .into_iter()
        .flat_map(|(sx, sy)| inner.iter().map(move |&(x, y)| (sx * 4 + x, sy * 4 + y)))
        .collect()
}
