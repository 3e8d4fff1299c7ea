use crate::error::{Error, Result};
use std::collections::HashSet;
use std::ops::Range;

/// Splits `ids` into consecutive rounds whose distinct rows fit in `capacity` cache slots.
///
/// Bag `b` covers `ids[bounds[b]..bounds[b + 1]]`. Rounds are cut at bag boundaries
/// whenever possible; a bag that alone names more than `capacity` distinct rows is cut
/// between ids, so its pooled value has to be merged across rounds. Ids equal to
/// `padding_idx` never occupy a slot and are ignored.
///
/// Each returned range is a non-empty range of positions in `ids`; together they cover
/// `0..ids.len()` in order.
///
/// # Errors
///
/// [`Error::Capacity`] when `capacity == 0` and some id needs a slot.
pub fn plan_rounds(
    ids: &[usize],
    bounds: &[usize],
    capacity: usize,
    padding_idx: Option<usize>,
) -> Result<Vec<Range<usize>>> {
    let is_lookup = |id: &usize| Some(*id) != padding_idx;
    if capacity == 0 {
        let requested = ids.iter().copied().filter(is_lookup).collect::<HashSet<_>>().len();
        if requested > 0 {
            return Err(Error::Capacity {
                capacity,
                requested,
            });
        }
    }

    let num_bags = bounds.len().saturating_sub(1);
    let mut rounds = Vec::new();
    let mut working_set = HashSet::new();
    let mut round_start = 0;

    for bag in 0..num_bags {
        let (start, end) = (bounds[bag], bounds[bag + 1]);
        let bag_rows: HashSet<usize> =
            ids[start..end].iter().copied().filter(is_lookup).collect();

        if bag_rows.len() > capacity {
            // Cut inside the bag, one id at a time.
            for (pos, &id) in ids.iter().enumerate().take(end).skip(start) {
                if !is_lookup(&id) || working_set.contains(&id) {
                    continue;
                }
                if working_set.len() == capacity {
                    rounds.push(round_start..pos);
                    round_start = pos;
                    working_set.clear();
                }
                working_set.insert(id);
            }
            continue;
        }

        let added = bag_rows.difference(&working_set).count();
        if working_set.len() + added > capacity {
            rounds.push(round_start..start);
            round_start = start;
            working_set.clear();
        }
        working_set.extend(bag_rows);
    }

    if round_start < ids.len() {
        rounds.push(round_start..ids.len());
    }
    Ok(rounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_fits_in_one_round() {
        let rounds = plan_rounds(&[0, 1, 1, 2], &[0, 2, 4], 3, None).unwrap();
        assert_eq!(rounds, vec![0..4]);
    }

    #[test]
    fn test_split_when_working_set_overflows() {
        // Bags {0,1}, {1,2}, {3,4}; capacity 3.
        let rounds = plan_rounds(&[0, 1, 1, 2, 3, 4], &[0, 2, 4, 6], 3, None).unwrap();
        assert_eq!(rounds, vec![0..4, 4..6]);
    }

    #[test]
    fn test_padding_takes_no_slot() {
        let rounds = plan_rounds(&[9, 0, 9, 1], &[0, 2, 4], 2, Some(9)).unwrap();
        assert_eq!(rounds, vec![0..4]);
    }

    #[test]
    fn test_bag_larger_than_cache_is_cut_between_ids() {
        // One bag of 5 distinct rows, repeats included, on a 2-slot cache.
        let ids = [0, 1, 0, 2, 3, 2, 4];
        let rounds = plan_rounds(&ids, &[0, 7], 2, None).unwrap();
        assert_eq!(rounds, vec![0..3, 3..6, 6..7]);
        for round in &rounds {
            let distinct: HashSet<_> = ids[round.clone()].iter().collect();
            assert!(distinct.len() <= 2);
        }
    }

    #[test]
    fn test_large_bag_after_small_bag() {
        // {5} then {0,1,2}; capacity 2.
        let rounds = plan_rounds(&[5, 0, 1, 2], &[0, 1, 4], 2, None).unwrap();
        assert_eq!(rounds, vec![0..2, 2..4]);
    }

    #[test]
    fn test_zero_capacity() {
        assert!(matches!(
            plan_rounds(&[0], &[0, 1], 0, None),
            Err(Error::Capacity {
                capacity: 0,
                requested: 1
            })
        ));
        // Nothing to look up: no error and no rounds.
        assert!(plan_rounds(&[], &[0, 0], 0, None).unwrap().is_empty());
        assert!(plan_rounds(&[], &[0], 0, None).unwrap().is_empty());
        assert_eq!(plan_rounds(&[3, 3], &[0, 2], 0, Some(3)).unwrap(), vec![0..2]);
    }
}
