//! System prompt rendering.
//!
//! Pure functions of the plan model; deterministic by construction so the
//! same plan state always produces the same prompt.

use crate::plan::{Planning, PlanningItem};

pub fn planner_prompt(task: &str, max_items: usize) -> String {
    format!(
        "You are a task-planning expert. Break the following complex task into a \
         detailed plan of independently executable steps, at most {max_items} of them.\n\
         \n\
         Analyze the task carefully, then call save_planning with the final task list.\n\
         Once the plan is saved, reply with \"done\" and nothing else.\n\
         \n\
         Task: {task}"
    )
}

/// `roster` pairs worker names with their capability descriptions; callers
/// pass it in a stable order.
pub fn assign_prompt(planning: &Planning, roster: &[(String, String)]) -> String {
    let workers = roster
        .iter()
        .map(|(name, instruction)| format!("worker name: {name}  capability: {instruction}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a project manager leading a team:\n\
         \n\
         {workers}\n\
         \n\
         Your team must solve this complex task:\n\
         \n\
         {root_task}\n\
         \n\
         The task was broken into a plan, currently in this state:\n\
         \n\
         {plan}\n\
         \n\
         Based on the plan's progress, call assign_next_todo with one worker (by name, \
         from the roster above) and one pending task (by id).",
        root_task = planning.root_task,
        plan = planning.to_markdown(1, true, false),
    )
}

pub fn accept_prompt(planning: &Planning, item: &PlanningItem) -> String {
    format!(
        "You are a project manager leading a team to solve this complex task:\n\
         \n\
         {root_task}\n\
         \n\
         The task was broken into a plan, currently in this state:\n\
         \n\
         {plan}\n\
         \n\
         You just assigned task [id: {id}] {description} to a team member. This is the \
         execution report they returned:\n\
         \n\
         {report}\n\
         \n\
         Judge whether the task is now sufficiently complete and call \
         accept_agent_response to record your decision. If it needs another attempt, \
         describe what is still missing in append_description.",
        root_task = planning.root_task,
        plan = planning.to_markdown(1, true, false),
        id = item.id,
        description = item.description,
        report = item.to_markdown(1, true),
    )
}

pub fn worker_prompt(instruction: &str, planning: &Planning, item: &PlanningItem) -> String {
    format!(
        "You are an expert at solving problems with tools. Your role: {instruction}\n\
         \n\
         The user provided a complex task:\n\
         \n\
         {root_task}\n\
         \n\
         It was broken into this execution plan:\n\
         \n\
         {plan}\n\
         \n\
         You must now execute item {id} of the plan:\n\
         \n\
         {description}\n\
         \n\
         Use the given tools to complete the task, then write up the process and the \
         result as your final output.",
        root_task = planning.root_task,
        plan = planning.to_markdown(1, true, false),
        id = item.id,
        description = item.description,
    )
}

pub fn summary_prompt(planning: &Planning) -> String {
    format!(
        "The user provided a complex task:\n\
         \n\
         {root_task}\n\
         \n\
         It was broken into the following plan, which has been fully executed:\n\
         \n\
         {plan}\n\
         \n\
         Based on the execution results above, give a final, summarizing answer.",
        root_task = planning.root_task,
        plan = planning.to_markdown(1, true, false),
    )
}
