use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::clients::{required_text, resolve_reference};
use crate::error::{AppError, Result, ValidationError};
use crate::models::{Client, Project, ProjectStatus, TimeEntry};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetUsage {
    pub spent: f64,
    pub budget: Option<f64>,
}

impl BudgetUsage {
    pub fn remaining(&self) -> Option<f64> {
        self.budget.map(|budget| budget - self.spent)
    }

    pub fn percent_used(&self) -> Option<f64> {
        self.budget
            .filter(|budget| *budget > 0.0)
            .map(|budget| self.spent / budget * 100.0)
    }

    pub fn is_over_budget(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining < 0.0)
    }
}

fn validate_budget(budget: Option<f64>) -> std::result::Result<Option<f64>, ValidationError> {
    match budget {
        Some(value) if !(value.is_finite() && value > 0.0) => Err(ValidationError::NonPositiveBudget),
        other => Ok(other),
    }
}

pub fn create_project<S: Store>(
    store: &mut S,
    client_id: Uuid,
    name: &str,
    budget: Option<f64>,
) -> Result<Project> {
    store
        .get::<Client>(client_id)?
        .ok_or_else(|| AppError::not_found("Client", client_id))?;

    let project = Project {
        id: Uuid::new_v4(),
        user_id: store.user_id(),
        client_id,
        name: required_text(name, "Project name")?,
        status: ProjectStatus::Active,
        budget: validate_budget(budget)?,
        created_at: Utc::now(),
    };
    store.insert(&project)?;
    info!(project = %project.name, "created project");
    Ok(project)
}

pub fn set_project_status<S: Store>(store: &mut S, id: Uuid, status: ProjectStatus) -> Result<Project> {
    let mut project = get_project(store, id)?;
    project.status = status;
    store.update(&project)?;
    info!(project = %project.name, %status, "changed project status");
    Ok(project)
}

pub fn set_project_budget<S: Store>(store: &mut S, id: Uuid, budget: Option<f64>) -> Result<Project> {
    let mut project = get_project(store, id)?;
    project.budget = validate_budget(budget)?;
    store.update(&project)?;
    Ok(project)
}

fn get_project<S: Store>(store: &S, id: Uuid) -> Result<Project> {
    store
        .get::<Project>(id)?
        .ok_or_else(|| AppError::not_found("Project", id))
}

/// Projects, optionally narrowed to one client and status, sorted by name.
pub fn list_projects<S: Store>(
    store: &S,
    client_id: Option<Uuid>,
    status: Option<ProjectStatus>,
) -> Result<Vec<Project>> {
    let mut projects: Vec<Project> = store
        .list::<Project>()?
        .into_iter()
        .filter(|project| client_id.is_none_or(|id| project.client_id == id))
        .filter(|project| status.is_none_or(|status| project.status == status))
        .collect();
    projects.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(projects)
}

pub fn find_project<S: Store>(store: &S, reference: &str, client_id: Option<Uuid>) -> Result<Project> {
    let projects = list_projects(store, client_id, None)?;
    resolve_reference(projects, reference, "Project", |project| (project.id, &project.name))
}

pub fn budget_usage(project: &Project, entries: &[TimeEntry]) -> BudgetUsage {
    let spent = entries
        .iter()
        .filter(|entry| entry.project_id == Some(project.id))
        .map(|entry| entry.amount)
        .sum();
    BudgetUsage {
        spent,
        budget: project.budget,
    }
}
