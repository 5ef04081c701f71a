use std::fmt::Write;

use chrono::NaiveDate;

use crate::budget::ReviewerGroup;

pub const ANALYSIS_SYSTEM: &str = "You are a senior engineer studying how a team reviews code. \
You extract concrete, recurring review expectations from real review comments.";

pub const PROMPT_SYSTEM: &str = "You write concise, actionable instructions for AI coding \
agents that review pull requests on behalf of a specific team.";

const MAX_DIFF_LINES: usize = 12;

/// Builds the first-pass prompt: every reviewer's comments with enough pull
/// request and diff context to infer what they care about.
pub fn analysis_prompt(org: &str, groups: &[ReviewerGroup]) -> String {
    let total: usize = groups.iter().map(|g| g.count).sum();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Below are {total} code review comments left by {} reviewers in the '{org}' \
         GitHub organization.\n",
        groups.len()
    );
    out.push_str(
        "Analyse them and produce a markdown report covering:\n\
         1. Recurring themes, grouped by category (correctness, naming, testing, style, \
         architecture, documentation, performance).\n\
         2. Each reviewer's distinctive focus areas.\n\
         3. Concrete rules a reviewer on this team would enforce, quoting representative \
         comments.\n\
         4. Anti-patterns the team repeatedly pushes back on.\n\n",
    );

    for group in groups {
        let _ = writeln!(out, "## Reviewer: {} ({} comments)\n", group.reviewer, group.count);
        for comment in &group.comments {
            let _ = writeln!(
                out,
                "### {}#{}: {}",
                comment.pr.repo, comment.pr.number, comment.pr.title
            );
            if !comment.diff_hunk.is_empty() {
                out.push_str("```diff\n");
                out.push_str(&tail_lines(&comment.diff_hunk, MAX_DIFF_LINES));
                out.push_str("\n```\n");
            }
            let _ = writeln!(out, "> {}\n", comment.body.trim().replace('\n', "\n> "));
        }
    }
    out
}

/// Second-pass prompt: turns the analysis into reviewer instructions.
pub fn prompt_generation_prompt(org: &str, analysis: &str) -> String {
    format!(
        "The following analysis describes how engineers in the '{org}' organization review \
         code.\n\n<analysis>\n{analysis}\n</analysis>\n\n\
         Write a markdown system prompt for an AI agent that reviews pull requests for this \
         team. Requirements:\n\
         - Open with a one-paragraph summary of the team's review philosophy.\n\
         - List the review rules as short imperative bullets, grouped by category, most \
         important first.\n\
         - Include a short example of a good review comment for the top categories.\n\
         - Do not mention individual reviewers by name.\n\
         - Output only the prompt, with no preamble."
    )
}

/// Wraps the generated prompt with a provenance header.
pub fn assemble_final(org: &str, generated_on: NaiveDate, reviewers: &[String], body: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Code Review Guidelines: {org}\n");
    let _ = writeln!(out, "_Generated on {generated_on} from review feedback by:_");
    if reviewers.is_empty() {
        out.push_str("_(no reviewers recorded)_\n");
    } else {
        let _ = writeln!(out, "_{}_", reviewers.join(", "));
    }
    out.push_str("\n---\n\n");
    out.push_str(body.trim());
    out.push('\n');
    out
}

/// Diff hunks can be long; the lines closest to the comment are at the end.
fn tail_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max);
    lines[start..].join("\n")
}
