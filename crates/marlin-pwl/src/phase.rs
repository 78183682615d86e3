use crate::case_split::Phase;

/// Current phase of every constraint, with an undo trail.
#[derive(Debug, Clone, Default)]
pub struct PhaseStore {
    phases: Vec<Phase>,
    trail: Vec<(usize, Phase)>,
}

impl PhaseStore {
    pub fn new(num_constraints: usize) -> Self {
        Self {
            phases: vec![Phase::Unfixed; num_constraints],
            trail: Vec::new(),
        }
    }

    #[inline]
    pub fn get(&self, constraint: usize) -> Phase {
        self.phases[constraint]
    }

    #[inline]
    pub fn is_fixed(&self, constraint: usize) -> bool {
        self.phases[constraint].is_fixed()
    }

    pub fn set(&mut self, constraint: usize, phase: Phase) {
        self.trail.push((constraint, self.phases[constraint]));
        self.phases[constraint] = phase;
    }

    pub fn as_slice(&self) -> &[Phase] {
        &self.phases
    }

    pub fn num_fixed(&self) -> usize {
        self.phases.iter().filter(|p| p.is_fixed()).count()
    }

    #[inline]
    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    pub fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some((constraint, old)) = self.trail.pop() {
                self.phases[constraint] = old;
            }
        }
    }

    pub fn clear_trail(&mut self) {
        self.trail.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_undo() {
        let mut phases = PhaseStore::new(3);
        let mark = phases.mark();
        phases.set(1, Phase::Active);
        phases.set(2, Phase::Element(4));
        assert_eq!(phases.num_fixed(), 2);
        phases.undo_to(mark);
        assert_eq!(phases.as_slice(), &[Phase::Unfixed; 3]);
    }
}
