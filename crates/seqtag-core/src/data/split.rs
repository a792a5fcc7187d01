use crate::error::{Result, SeqtagError};

/// Shuffle `items` with a fixed seed and split off `ceil(len * test_size)`
/// of them as the test part. Returns `(train, test)`.
pub fn train_test_split<T: Clone>(items: &[T], test_size: f64, seed: u64) -> Result<(Vec<T>, Vec<T>)> {
    if !(0.0..1.0).contains(&test_size) {
        return Err(SeqtagError::InvalidConfig(format!(
            "test_size must be in [0, 1), got {test_size}"
        )));
    }

    let mut indices: Vec<usize> = (0..items.len()).collect();
    shuffle(&mut indices, seed);

    let n_test = (items.len() as f64 * test_size).ceil() as usize;
    let (test_idx, train_idx) = indices.split_at(n_test);

    let train = train_idx.iter().map(|&i| items[i].clone()).collect();
    let test = test_idx.iter().map(|&i| items[i].clone()).collect();
    Ok((train, test))
}

/// Seeded Fisher-Yates shuffle.
pub fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut rng = oorandom::Rand64::new(seed as u128);
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
