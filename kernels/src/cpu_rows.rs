use crate::{KernelElem, KernelError, Result, row_count};
use rayon::prelude::*;

/// Packs the selected rows of `src` into one contiguous staging buffer.
///
/// This is the CPU stand-in for a single batched transfer: the rows are gathered once
/// and handed to the destination as one block instead of `rows.len()` small copies.
///
/// # Arguments
///
/// * `src` - Row-major source matrix, `width` columns per row.
/// * `width` - Number of columns per row.
/// * `rows` - Source row indices, in the order they should appear in the output.
pub fn cpu_gather_rows<T: KernelElem>(src: &[T], width: usize, rows: &[usize]) -> Result<Vec<T>> {
    let src_rows = row_count(src, width)?;
    if let Some(&bad) = rows.iter().find(|&&r| r >= src_rows && width > 0) {
        return Err(KernelError::IndexOutOfBounds {
            index: bad,
            rows: src_rows,
        });
    }

    let mut out = vec![T::zero(); rows.len() * width];
    if width == 0 {
        return Ok(out);
    }

    out.par_chunks_mut(width)
        .zip(rows.par_iter())
        .for_each(|(dst, &row)| {
            dst.copy_from_slice(&src[row * width..(row + 1) * width]);
        });

    Ok(out)
}

/// Unpacks a staging buffer produced by [`cpu_gather_rows`] into the selected rows of `dst`.
///
/// `packed` holds `rows.len()` rows back to back; row `i` of `packed` lands at `rows[i]`.
pub fn cpu_scatter_rows<T: KernelElem>(
    dst: &mut [T],
    width: usize,
    rows: &[usize],
    packed: &[T],
) -> Result<()> {
    let dst_rows = row_count(dst, width)?;
    if packed.len() != rows.len() * width {
        return Err(KernelError::ShapeMismatch {
            expected: vec![rows.len(), width],
            got: vec![packed.len()],
        });
    }
    if width == 0 {
        return Ok(());
    }

    if let Some(&row) = rows.iter().find(|&&row| row >= dst_rows) {
        return Err(KernelError::IndexOutOfBounds {
            index: row,
            rows: dst_rows,
        });
    }

    for (&row, src) in rows.iter().zip(packed.chunks_exact(width)) {
        dst[row * width..(row + 1) * width].copy_from_slice(src);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_rows_order() {
        // 3 rows of width 2
        let src = vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0];
        let packed = cpu_gather_rows(&src, 2, &[2, 0]).unwrap();
        assert_eq!(packed, vec![20.0, 21.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gather_rows_out_of_bounds() {
        let src = vec![0.0f32; 4];
        let err = cpu_gather_rows(&src, 2, &[2]);
        assert!(matches!(
            err,
            Err(KernelError::IndexOutOfBounds { index: 2, rows: 2 })
        ));
    }

    #[test]
    fn test_scatter_rows() {
        let mut dst = vec![0.0; 6];
        cpu_scatter_rows(&mut dst, 2, &[1, 2], &[5.0, 6.0, 7.0, 8.0]).unwrap();
        assert_eq!(dst, vec![0.0, 0.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_scatter_rows_length_mismatch() {
        let mut dst = vec![0.0; 6];
        let err = cpu_scatter_rows(&mut dst, 2, &[1, 2], &[5.0, 6.0]);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_scatter_rows_bad_index_writes_nothing() {
        let mut dst = vec![0.0; 4];
        let err = cpu_scatter_rows(&mut dst, 2, &[0, 2], &[5.0, 6.0, 7.0, 8.0]);
        assert!(matches!(
            err,
            Err(KernelError::IndexOutOfBounds { index: 2, rows: 2 })
        ));
        assert_eq!(dst, vec![0.0; 4]);
    }

    #[test]
    fn test_ragged_source() {
        let src = vec![0.0f32; 5];
        assert!(cpu_gather_rows(&src, 2, &[0]).is_err());
    }
}
