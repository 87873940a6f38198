use std::fmt::Write;

use adgen_core::{
    AppViewModel, CandidateView, Disposition, Entitlement, JobPhase, JobRowView, JobStatus,
    Notice, ReviewView, StreamStage,
};

pub fn render(view: &AppViewModel) -> String {
    let mut out = String::new();

    let plan = match &view.entitlement {
        Entitlement::Free => "free".to_string(),
        Entitlement::Paid { tier } => tier.clone(),
    };
    let _ = match view.credits {
        Some(credits) => writeln!(out, "Plan: {plan} | Credits: {credits}"),
        None => writeln!(out, "Plan: {plan}"),
    };

    if view.jobs.is_empty() {
        out.push_str("No jobs yet. Type `help` for commands.\n");
    }
    for job in &view.jobs {
        let _ = writeln!(out, "{}", job_line(job));
    }

    if let Some(review) = &view.review {
        render_review(&mut out, review);
    }

    let locked = view.gallery.iter().filter(|item| item.candidate.locked).count();
    if !view.gallery.is_empty() {
        let _ = writeln!(
            out,
            "Gallery: {} items, {} locked",
            view.gallery.len(),
            locked
        );
    }

    if let Some(selected) = &view.selected {
        let _ = writeln!(
            out,
            "Selected from #{}: {}",
            selected.ticket,
            candidate_line(&selected.candidate)
        );
    }

    for notice in &view.notices {
        let _ = writeln!(out, "! {}", notice_text(notice));
    }
    out
}

fn job_line(job: &JobRowView) -> String {
    let mut line = format!("#{} {} [{}]", job.ticket, job.kind, phase_label(&job.phase));
    if let Some(status) = job.status {
        let _ = write!(line, " {}", status_label(status));
    }
    if let Some(stage) = job.stage {
        let _ = write!(line, " {}", stage_label(stage));
    }
    if let Some(percent) = job.image_progress {
        let _ = write!(line, " {percent}%");
    }
    if !job.progress_message.is_empty() {
        let _ = write!(line, " - {}", job.progress_message);
    }
    if let Some(error) = &job.error {
        let _ = write!(line, " ({error})");
    }
    if job.retry_available {
        line.push_str(" [retry available]");
    }
    line
}

fn render_review(out: &mut String, review: &ReviewView) {
    let _ = writeln!(
        out,
        "Review #{}: {} left, {} saved, {} rejected",
        review.ticket, review.remaining_count, review.saved_count, review.rejected_count
    );
    match &review.reviewed {
        Some(saved) => {
            let _ = writeln!(out, "  All decided. Saved:");
            for candidate in saved {
                let _ = writeln!(out, "    {}", candidate_line(candidate));
            }
        }
        None => {
            if let Some(top) = &review.top {
                let _ = writeln!(out, "  Top: {}", candidate_line(top));
            }
        }
    }
    if review.can_restore {
        out.push_str("  (restore available)\n");
    }
}

fn candidate_line(candidate: &CandidateView) -> String {
    let mut line = format!("{} (#{})", candidate.id, candidate.ordinal + 1);
    if candidate.locked {
        line.push_str(" [locked]");
    } else if let Some(media) = &candidate.media_ref {
        let _ = write!(line, " {media}");
    }
    if let Some(score) = candidate.score {
        let _ = write!(line, " score {score:.2}");
    }
    match candidate.disposition {
        Disposition::Undecided => {}
        Disposition::Saved => line.push_str(" saved"),
        Disposition::Rejected => line.push_str(" rejected"),
    }
    line
}

fn phase_label(phase: &JobPhase) -> &'static str {
    match phase {
        JobPhase::Starting => "starting",
        JobPhase::Tracking => "running",
        JobPhase::Completed => "done",
        JobPhase::Partial => "partial",
        JobPhase::Failed { .. } => "failed",
        JobPhase::Halted { .. } => "halted",
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Partial => "partial",
    }
}

fn stage_label(stage: StreamStage) -> &'static str {
    match stage {
        StreamStage::Preparing => "preparing",
        StreamStage::Scripts => "writing scripts",
        StreamStage::Images => "rendering images",
        StreamStage::Complete => "complete",
        StreamStage::Failed => "failed",
    }
}

fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::InvalidInput { message } => format!("Invalid input: {message}"),
        Notice::SignInRequired => "Sign in required.".to_string(),
        Notice::QuotaExceeded { message } => format!("Out of credits: {message}"),
        Notice::JobFailed { ticket, message } => format!("Job #{ticket} failed: {message}"),
        Notice::StreamFailed { ticket, message } => {
            format!("Progress for job #{ticket} was lost: {message}")
        }
        Notice::ConnectionLost { ticket } => {
            format!("Lost contact with job #{ticket}. Type `retry {ticket}` to resume.")
        }
        Notice::DisposalRolledBack {
            candidate_id,
            message,
        } => format!("{candidate_id} was put back on the stack: {message}"),
        Notice::LockedContent { candidate_id } => {
            format!("{candidate_id} is locked on the free plan.")
        }
    }
}
