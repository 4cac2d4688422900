use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

use crate::schemas::canvas::{AssignmentGroup, CreatedResource};
use crate::services::canvas_api::{ApiMethod, ApiResponse, CanvasApiClient};

pub(crate) const ASSIGNMENT_GROUP_NAME: &str = "IPE Competencies";
pub(crate) const ASSIGNMENT_NAME: &str = "IPE Competencies Attained";
pub(crate) const ASSIGNMENT_DESCRIPTION: &str = "This assignment is used for applying IPE \
     competencies and does not require any student submissions";
/// Far past any real group so the new group lands at the end.
pub(crate) const ASSIGNMENT_GROUP_POSITION: u32 = 2000;
const LOOKUP_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowStep {
    LookUpGroup,
    DeleteAssignment,
    CreateGroup,
    CreateAssignment,
    AttachRubric,
}

impl FlowStep {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::LookUpGroup => "look_up_group",
            Self::DeleteAssignment => "delete_assignment",
            Self::CreateGroup => "create_group",
            Self::CreateAssignment => "create_assignment",
            Self::AttachRubric => "attach_rubric",
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub(crate) enum FlowError {
    #[error("{step} failed for course {course_id}: {context}")]
    NoResponse { course_id: u64, step: FlowStep, context: String },
    #[error("{step} returned an unexpected body for course {course_id}: {detail}")]
    UnexpectedBody { course_id: u64, step: FlowStep, detail: String },
}

impl FlowError {
    pub(crate) fn step(&self) -> FlowStep {
        match self {
            Self::NoResponse { step, .. } | Self::UnexpectedBody { step, .. } => *step,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GroupLookup {
    pub(crate) matched_group_ids: Vec<u64>,
    pub(crate) deleted_assignment_ids: Vec<u64>,
}

impl GroupLookup {
    pub(crate) fn group_id(&self) -> Option<u64> {
        self.matched_group_ids.first().copied()
    }
}

pub(crate) struct AssignmentFlow<'a> {
    api: &'a CanvasApiClient,
    course_id: u64,
    rubric_id: u64,
}

impl<'a> AssignmentFlow<'a> {
    pub(crate) fn new(api: &'a CanvasApiClient, course_id: u64, rubric_id: u64) -> Self {
        Self { api, course_id, rubric_id }
    }

    pub(crate) async fn start_assignment_flow(&self) -> Result<u64, FlowError> {
        tracing::info!(course_id = self.course_id, "Starting IPE assignment flow");

        let lookup = self.look_up_ipe_assignment().await?;
        if !lookup.deleted_assignment_ids.is_empty() {
            tracing::info!(
                course_id = self.course_id,
                deleted = ?lookup.deleted_assignment_ids,
                "Removed copied IPE assignments"
            );
        }
        let group_id = match lookup.group_id() {
            Some(group_id) => {
                if lookup.matched_group_ids.len() > 1 {
                    tracing::warn!(
                        course_id = self.course_id,
                        group_ids = ?lookup.matched_group_ids,
                        group_id,
                        "Several IPE assignment groups found; using the first"
                    );
                }
                group_id
            }
            None => self.create_assignment_group().await?,
        };

        let assignment_id = self.create_assignment(group_id).await?;
        self.assign_ipe_rubric(assignment_id).await?;
        Ok(assignment_id)
    }

    pub(crate) async fn look_up_ipe_assignment(&self) -> Result<GroupLookup, FlowError> {
        let endpoint = format!("courses/{}/assignment_groups", self.course_id);
        let payload = [
            ("include[]", "assignments".to_string()),
            ("per_page", LOOKUP_PAGE_SIZE.to_string()),
        ];
        let response = self.api.call(&endpoint, ApiMethod::Get, &payload).await;
        let response = self.require(response, FlowStep::LookUpGroup, || {
            format!(
                "looking up assignment group '{}' with assignment '{}'",
                ASSIGNMENT_GROUP_NAME, ASSIGNMENT_NAME
            )
        })?;
        let groups: Vec<AssignmentGroup> = self.parse(&response, FlowStep::LookUpGroup)?;

        let mut lookup = GroupLookup::default();
        for group in groups.iter().filter(|group| group.name.trim() == ASSIGNMENT_GROUP_NAME) {
            let assignments = group.assignments().map_err(|err| FlowError::UnexpectedBody {
                course_id: self.course_id,
                step: FlowStep::LookUpGroup,
                detail: format!("assignments of group {}: {err}", group.id),
            })?;
            let stale = assignments.iter().filter(|item| item.name.trim() == ASSIGNMENT_NAME);
            for assignment in stale {
                self.delete_assignment(assignment.id).await?;
                lookup.deleted_assignment_ids.push(assignment.id);
            }
            lookup.matched_group_ids.push(group.id);
        }

        Ok(lookup)
    }

    async fn delete_assignment(&self, assignment_id: u64) -> Result<(), FlowError> {
        let endpoint = format!("courses/{}/assignments/{}", self.course_id, assignment_id);
        let response = self.api.call(&endpoint, ApiMethod::Delete, &[]).await;
        self.require(response, FlowStep::DeleteAssignment, || {
            format!("deleting assignment {assignment_id}")
        })?;

        metrics::counter!("ipe_assignments_deleted_total").increment(1);
        tracing::info!(course_id = self.course_id, assignment_id, "Deleted assignment");
        Ok(())
    }

    async fn create_assignment_group(&self) -> Result<u64, FlowError> {
        let endpoint = format!("courses/{}/assignment_groups", self.course_id);
        let payload = [
            ("name", ASSIGNMENT_GROUP_NAME.to_string()),
            ("position", ASSIGNMENT_GROUP_POSITION.to_string()),
        ];
        let response = self.api.call(&endpoint, ApiMethod::Post, &payload).await;
        let response = self.require(response, FlowStep::CreateGroup, || {
            format!("creating assignment group '{ASSIGNMENT_GROUP_NAME}'")
        })?;
        let created: CreatedResource = self.parse(&response, FlowStep::CreateGroup)?;

        tracing::info!(
            course_id = self.course_id,
            group_id = created.id,
            "Created assignment group"
        );
        Ok(created.id)
    }

    async fn create_assignment(&self, group_id: u64) -> Result<u64, FlowError> {
        let endpoint = format!("courses/{}/assignments", self.course_id);
        let payload = [
            ("assignment[name]", ASSIGNMENT_NAME.to_string()),
            ("assignment[description]", ASSIGNMENT_DESCRIPTION.to_string()),
            ("assignment[points_possible]", "0".to_string()),
            ("assignment[submission_types][]", "none".to_string()),
            ("assignment[assignment_group_id]", group_id.to_string()),
            ("assignment[notify_of_update]", "false".to_string()),
            ("assignment[published]", "true".to_string()),
            ("assignment[omit_from_final_grade]", "true".to_string()),
            ("assignment[grading_type]", "not_graded".to_string()),
        ];
        let response = self.api.call(&endpoint, ApiMethod::Post, &payload).await;
        let response = self.require(response, FlowStep::CreateAssignment, || {
            format!("creating assignment in group {group_id}")
        })?;
        let created: CreatedResource = self.parse(&response, FlowStep::CreateAssignment)?;

        tracing::info!(
            course_id = self.course_id,
            group_id,
            assignment_id = created.id,
            "Created assignment"
        );
        Ok(created.id)
    }

    async fn assign_ipe_rubric(&self, assignment_id: u64) -> Result<(), FlowError> {
        let endpoint = format!("courses/{}/rubric_associations", self.course_id);
        let payload = [
            ("rubric_association[association_type]", "Assignment".to_string()),
            ("rubric_association[association_id]", assignment_id.to_string()),
            ("rubric_association[use_for_grading]", "false".to_string()),
            ("rubric_association[purpose]", "grading".to_string()),
            ("rubric_association[rubric_id]", self.rubric_id.to_string()),
        ];
        let response = self.api.call(&endpoint, ApiMethod::Post, &payload).await;
        let response = self.require(response, FlowStep::AttachRubric, || {
            format!("assigning rubric {} to assignment {assignment_id}", self.rubric_id)
        })?;
        if response.status.is_client_error() || response.status.is_server_error() {
            tracing::warn!(
                course_id = self.course_id,
                assignment_id,
                rubric_id = self.rubric_id,
                status = response.status.as_u16(),
                body = %response.body,
                "Rubric association reply carried an error status"
            );
        }

        tracing::info!(
            course_id = self.course_id,
            assignment_id,
            rubric_id = self.rubric_id,
            "Rubric assigned"
        );
        Ok(())
    }

    fn require(
        &self,
        response: Option<ApiResponse>,
        step: FlowStep,
        context: impl FnOnce() -> String,
    ) -> Result<ApiResponse, FlowError> {
        response.ok_or_else(|| FlowError::NoResponse {
            course_id: self.course_id,
            step,
            context: context(),
        })
    }

    fn parse<T: DeserializeOwned>(
        &self,
        response: &ApiResponse,
        step: FlowStep,
    ) -> Result<T, FlowError> {
        response.parse().map_err(|err| FlowError::UnexpectedBody {
            course_id: self.course_id,
            step,
            detail: format!("status {}: {err}: {}", response.status, response.body),
        })
    }
}
