use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::order::OrderLine;
use crate::stage::Stage;

/// Per-stage item verification for one order.
///
/// A checked line records the quantity the worker counted. A line is matched
/// when it is checked and the count equals the intake quantity; the checklist
/// is complete when every order line is matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChecklist {
    stage: Stage,
    counted: BTreeMap<u32, u32>,
}

/// A checked line whose count differs from intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    pub line_no: u32,
    pub expected: u32,
    pub counted: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistProgress {
    pub total: usize,
    pub checked: usize,
    pub matched: usize,
}

impl ChecklistProgress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.matched == self.total
    }
}

impl StageChecklist {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            counted: BTreeMap::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Tick a line, replacing any earlier count.
    pub fn check(&mut self, line_no: u32, counted: u32) {
        self.counted.insert(line_no, counted);
    }

    pub fn uncheck(&mut self, line_no: u32) {
        self.counted.remove(&line_no);
    }

    pub fn is_checked(&self, line_no: u32) -> bool {
        self.counted.contains_key(&line_no)
    }

    pub fn counted(&self, line_no: u32) -> Option<u32> {
        self.counted.get(&line_no).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.counted.is_empty()
    }

    pub fn progress(&self, lines: &[OrderLine]) -> ChecklistProgress {
        let checked = lines.iter().filter(|l| self.is_checked(l.line_no)).count();
        let matched = lines
            .iter()
            .filter(|l| self.counted(l.line_no) == Some(l.quantity))
            .count();
        ChecklistProgress {
            total: lines.len(),
            checked,
            matched,
        }
    }

    pub fn is_complete(&self, lines: &[OrderLine]) -> bool {
        self.progress(lines).is_complete()
    }

    /// Checked lines whose count disagrees with intake, by line number.
    pub fn mismatches(&self, lines: &[OrderLine]) -> Vec<CountMismatch> {
        lines
            .iter()
            .filter_map(|l| match self.counted(l.line_no) {
                Some(counted) if counted != l.quantity => Some(CountMismatch {
                    line_no: l.line_no,
                    expected: l.quantity,
                    counted,
                }),
                _ => None,
            })
            .collect()
    }

    /// Lines nobody has ticked yet.
    pub fn unchecked_lines(&self, lines: &[OrderLine]) -> Vec<u32> {
        lines
            .iter()
            .filter(|l| !self.is_checked(l.line_no))
            .map(|l| l.line_no)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use washline_catalog::ServiceItemId;
    use washline_core::AggregateId;

    fn line(line_no: u32, quantity: u32) -> OrderLine {
        OrderLine {
            line_no,
            item_id: ServiceItemId::new(AggregateId::new()),
            description: format!("line {line_no}"),
            quantity,
            unit_price: 100,
        }
    }

    #[test]
    fn complete_only_when_every_count_matches() {
        let lines = vec![line(1, 3), line(2, 1)];
        let mut checklist = StageChecklist::new(Stage::Tagging);
        assert!(!checklist.is_complete(&lines));

        checklist.check(1, 3);
        assert!(!checklist.is_complete(&lines));
        assert_eq!(checklist.unchecked_lines(&lines), vec![2]);

        checklist.check(2, 1);
        assert!(checklist.is_complete(&lines));
        assert_eq!(
            checklist.progress(&lines),
            ChecklistProgress {
                total: 2,
                checked: 2,
                matched: 2
            }
        );
    }

    #[test]
    fn wrong_count_is_checked_but_not_matched() {
        let lines = vec![line(1, 5)];
        let mut checklist = StageChecklist::new(Stage::Washing);
        checklist.check(1, 4);

        assert!(checklist.is_checked(1));
        assert!(!checklist.is_complete(&lines));
        assert_eq!(
            checklist.mismatches(&lines),
            vec![CountMismatch {
                line_no: 1,
                expected: 5,
                counted: 4
            }]
        );

        checklist.check(1, 5);
        assert!(checklist.mismatches(&lines).is_empty());
        assert!(checklist.is_complete(&lines));
    }

    #[test]
    fn uncheck_reopens_the_line() {
        let lines = vec![line(1, 2)];
        let mut checklist = StageChecklist::new(Stage::Packing);
        checklist.check(1, 2);
        checklist.uncheck(1);
        assert!(checklist.is_empty());
        assert!(!checklist.is_complete(&lines));
    }

    #[test]
    fn order_without_lines_is_never_complete() {
        let checklist = StageChecklist::new(Stage::Entry);
        assert!(!checklist.is_complete(&[]));
    }
}
