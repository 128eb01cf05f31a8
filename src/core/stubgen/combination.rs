/// One selected index per dimension: context, initial point, then each discovered endpoint.
pub type Combination = Vec<usize>;

/// Projection of a passed combination; `None` slots were not exercised and match anything.
pub type PassedCombination = Vec<Option<usize>>;

/// Lexicographic walk over the cartesian product of `sizes`, later slots varying fastest.
///
/// Dimensions may be appended while walking. The current position is extended with `0` and the
/// walk continues from there instead of starting over.
#[derive(Debug, Clone, Default)]
pub struct ProductCursor {
    sizes: Vec<usize>,
    current: Option<Combination>,
    exhausted: bool,
}

impl ProductCursor {
    pub fn new(sizes: Vec<usize>) -> Self {
        Self {
            sizes,
            current: None,
            exhausted: false,
        }
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Size of the full iteration space.
    pub fn space(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn push_dimension(&mut self, size: usize) {
        self.sizes.push(size);
        if let Some(current) = self.current.as_mut() {
            current.push(0);
        }
    }

    pub fn next_combination(&mut self) -> Option<Combination> {
        if self.exhausted {
            return None;
        }
        if self.sizes.iter().any(|size| *size == 0) {
            self.exhausted = true;
            return None;
        }
        let next = match self.current.take() {
            None => Some(vec![0; self.sizes.len()]),
            Some(mut current) => {
                let mut advanced = false;
                for slot in (0..current.len()).rev() {
                    if current[slot] + 1 < self.sizes[slot] {
                        current[slot] += 1;
                        current[slot + 1..].iter_mut().for_each(|value| *value = 0);
                        advanced = true;
                        break;
                    }
                }
                advanced.then_some(current)
            }
        };
        match next {
            Some(combination) => {
                self.current = Some(combination.clone());
                Some(combination)
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

/// A candidate is covered when some record agrees with it on every exercised slot.
pub fn is_covered(candidate: &[usize], passed: &[PassedCombination]) -> bool {
    passed.iter().rev().any(|record| {
        record.iter().enumerate().all(|(slot, value)| match value {
            Some(value) => candidate.get(slot) == Some(value),
            None => true,
        })
    })
}
