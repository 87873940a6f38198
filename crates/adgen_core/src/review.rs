use std::collections::{HashMap, HashSet};

use adgen_logging::{adgen_debug, adgen_warn};

use crate::{Candidate, CandidateId, Direction, Disposition};

/// Correlates a disposal with its acknowledgment result.
pub type AckToken = u64;

/// A local disposal the backend still has to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposal {
    pub candidate_id: CandidateId,
    pub direction: Direction,
    pub token: AckToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Confirmed,
    /// The candidate went back on top of the stack.
    RolledBack { candidate_id: CandidateId },
    /// The ack belongs to a disposal that was restored or re-done since.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HistoryEntry {
    candidate_id: CandidateId,
    token: AckToken,
}

/// Terminal view once every candidate has been decided.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewedView<'a> {
    pub saved: Vec<&'a Candidate>,
    pub rejected_count: usize,
}

/// Triage stack over one job's candidates.
///
/// Candidates live in an arena keyed by id; `remaining` is the ordered key
/// list with the top of the stack at the highest index. Each candidate id is
/// in exactly one of `remaining`, `saved` or `rejected` at all times.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewQueue {
    arena: HashMap<CandidateId, Candidate>,
    remaining: Vec<CandidateId>,
    saved: Vec<CandidateId>,
    rejected: Vec<CandidateId>,
    cursor: isize,
    initial_count: usize,
    history: Vec<HistoryEntry>,
    pending_acks: HashMap<CandidateId, AckToken>,
    next_token: AckToken,
}

impl ReviewQueue {
    pub fn initialize(candidates: Vec<Candidate>) -> Self {
        let mut arena = HashMap::with_capacity(candidates.len());
        let mut remaining = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            if arena.contains_key(&candidate.id) {
                adgen_warn!("review queue: duplicate candidate {} dropped", candidate.id);
                continue;
            }
            candidate.disposition = Disposition::Undecided;
            remaining.push(candidate.id.clone());
            arena.insert(candidate.id.clone(), candidate);
        }
        let initial_count = remaining.len();
        Self {
            arena,
            cursor: initial_count as isize - 1,
            remaining,
            saved: Vec::new(),
            rejected: Vec::new(),
            initial_count,
            history: Vec::new(),
            pending_acks: HashMap::new(),
            next_token: 0,
        }
    }

    /// Applies a swipe locally. Returns the ack the caller must send, or
    /// `None` when the candidate is not in `remaining`.
    pub fn dispose(&mut self, candidate_id: &CandidateId, direction: Direction) -> Option<Disposal> {
        let Some(position) = self.remaining.iter().position(|id| id == candidate_id) else {
            adgen_debug!("review queue: {candidate_id} is not pending, ignoring {direction:?}");
            return None;
        };

        let id = self.remaining.remove(position);
        self.cursor -= 1;
        match direction {
            Direction::Accept => self.saved.push(id.clone()),
            Direction::Reject => self.rejected.push(id.clone()),
        }
        if let Some(candidate) = self.arena.get_mut(&id) {
            candidate.disposition = direction.disposition();
        }

        self.next_token += 1;
        let token = self.next_token;
        self.pending_acks.insert(id.clone(), token);
        self.history.push(HistoryEntry {
            candidate_id: id.clone(),
            token,
        });
        self.debug_check();

        Some(Disposal {
            candidate_id: id,
            direction,
            token,
        })
    }

    pub fn ack_succeeded(&mut self, candidate_id: &CandidateId, token: AckToken) -> AckOutcome {
        if self.pending_acks.get(candidate_id) != Some(&token) {
            return AckOutcome::Superseded;
        }
        self.pending_acks.remove(candidate_id);
        AckOutcome::Confirmed
    }

    /// The backend did not record the disposal: put the candidate back on top.
    pub fn ack_failed(&mut self, candidate_id: &CandidateId, token: AckToken) -> AckOutcome {
        if self.pending_acks.get(candidate_id) != Some(&token) {
            return AckOutcome::Superseded;
        }
        self.pending_acks.remove(candidate_id);
        self.history.retain(|entry| entry.token != token);
        if !self.undo_disposition(candidate_id) {
            return AckOutcome::Superseded;
        }
        adgen_warn!("review queue: rolled back {candidate_id} after failed ack");
        AckOutcome::RolledBack {
            candidate_id: candidate_id.clone(),
        }
    }

    /// Undoes the most recent disposal, re-inserting at `cursor + 1`.
    ///
    /// Local only; an ack still in flight for that disposal is ignored when it
    /// lands.
    pub fn restore(&mut self) -> Option<CandidateId> {
        let entry = self.history.pop()?;
        self.pending_acks.remove(&entry.candidate_id);
        if self.undo_disposition(&entry.candidate_id) {
            Some(entry.candidate_id)
        } else {
            None
        }
    }

    fn undo_disposition(&mut self, candidate_id: &CandidateId) -> bool {
        let removed = remove_id(&mut self.saved, candidate_id)
            || remove_id(&mut self.rejected, candidate_id);
        if !removed {
            return false;
        }
        let insert_at = (self.cursor + 1) as usize;
        self.remaining.insert(insert_at, candidate_id.clone());
        self.cursor += 1;
        if let Some(candidate) = self.arena.get_mut(candidate_id) {
            candidate.disposition = Disposition::Undecided;
        }
        self.debug_check();
        true
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    /// The candidate currently on top of the stack.
    pub fn top(&self) -> Option<&Candidate> {
        self.remaining.last().and_then(|id| self.arena.get(id))
    }

    pub fn get(&self, candidate_id: &CandidateId) -> Option<&Candidate> {
        self.arena.get(candidate_id)
    }

    pub fn remaining(&self) -> Vec<&Candidate> {
        self.collect(&self.remaining)
    }

    pub fn saved(&self) -> Vec<&Candidate> {
        self.collect(&self.saved)
    }

    pub fn rejected(&self) -> Vec<&Candidate> {
        self.collect(&self.rejected)
    }

    /// Every candidate regardless of disposition, in delivery order.
    pub fn all_candidates(&self) -> Vec<&Candidate> {
        let mut all: Vec<&Candidate> = self.arena.values().collect();
        all.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn remaining_count(&self) -> usize {
        self.remaining.len()
    }

    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn initial_count(&self) -> usize {
        self.initial_count
    }

    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks.len()
    }

    pub fn is_pending(&self, candidate_id: &CandidateId) -> bool {
        self.remaining.contains(candidate_id)
    }

    pub fn can_restore(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn is_reviewed(&self) -> bool {
        self.remaining.is_empty() && (!self.saved.is_empty() || !self.rejected.is_empty())
    }

    pub fn reviewed_view(&self) -> Option<ReviewedView<'_>> {
        if !self.is_reviewed() {
            return None;
        }
        Some(ReviewedView {
            saved: self.saved(),
            rejected_count: self.rejected.len(),
        })
    }

    fn collect(&self, ids: &[CandidateId]) -> Vec<&Candidate> {
        ids.iter().filter_map(|id| self.arena.get(id)).collect()
    }

    fn debug_check(&self) {
        debug_assert_eq!(
            self.remaining.len() + self.saved.len() + self.rejected.len(),
            self.initial_count
        );
        debug_assert_eq!(self.cursor, self.remaining.len() as isize - 1);
        debug_assert_eq!(
            self.remaining
                .iter()
                .chain(&self.saved)
                .chain(&self.rejected)
                .collect::<HashSet<_>>()
                .len(),
            self.initial_count
        );
    }
}

fn remove_id(ids: &mut Vec<CandidateId>, candidate_id: &CandidateId) -> bool {
    match ids.iter().position(|id| id == candidate_id) {
        Some(position) => {
            ids.remove(position);
            true
        }
        None => false,
    }
}
