//! Non-owning, predicate-filtered forward view over a slice.
//!
//! Grounded on `Foundation/include/Containers/AxRange.h`'s role in the
//! original: a lightweight range wrapper used anywhere a dense array needs
//! to be exposed as a read-only sequence, distinct from the ECS-specific
//! multi-component `View` in `apex_ecs` (grounded instead on
//! `Apex/Engine/include/Apex/ECS/View.h`).

pub struct View<'a, T> {
    slice: &'a [T],
    predicate: Box<dyn Fn(&T) -> bool + 'a>,
}

impl<'a, T> View<'a, T> {
    pub fn new(slice: &'a [T]) -> Self {
        Self {
            slice,
            predicate: Box::new(|_| true),
        }
    }

    pub fn filter(slice: &'a [T], predicate: impl Fn(&T) -> bool + 'a) -> Self {
        Self {
            slice,
            predicate: Box::new(predicate),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slice.iter().filter(move |item| (self.predicate)(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfiltered_view_yields_everything() {
        let data = [1, 2, 3];
        let view = View::new(&data);
        assert_eq!(view.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn filtered_view_yields_matching_elements_only() {
        let data = [1, 2, 3, 4, 5];
        let view = View::filter(&data, |x| x % 2 == 0);
        assert_eq!(view.iter().copied().collect::<Vec<_>>(), vec![2, 4]);
    }
}
