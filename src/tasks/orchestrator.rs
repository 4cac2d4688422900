use anyhow::{Context, Result};
use tracing::Instrument;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::services::assignment_flow::{AssignmentFlow, FlowStep};
use crate::services::canvas_api::CanvasApiClient;
use crate::services::course_sheet::CourseSource;
use crate::services::course_table::{clean_course_table, CourseRecord};
use crate::services::rubrics::fetch_rubric;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProvisionedCourse {
    pub(crate) course_id: u64,
    pub(crate) assignment_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FailedCourse {
    pub(crate) course_id: u64,
    pub(crate) step: FlowStep,
    pub(crate) error: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BatchReport {
    pub(crate) provisioned: Vec<ProvisionedCourse>,
    pub(crate) failed: Vec<FailedCourse>,
}

pub(crate) struct Orchestrator<'a> {
    settings: &'a Settings,
    api: &'a CanvasApiClient,
    source: &'a dyn CourseSource,
}

impl<'a> Orchestrator<'a> {
    pub(crate) fn new(
        settings: &'a Settings,
        api: &'a CanvasApiClient,
        source: &'a dyn CourseSource,
    ) -> Self {
        Self { settings, api, source }
    }

    /// Runs the whole batch. Setup failures (sheet, cleaning, rubric) are
    /// returned as errors; a failing course is logged and skipped.
    pub(crate) async fn start_composing_process(&self) -> Result<BatchReport> {
        let run_id = Uuid::new_v4();
        self.compose().instrument(tracing::info_span!("ipe_batch", %run_id)).await
    }

    async fn compose(&self) -> Result<BatchReport> {
        let courses = self.load_courses().await.inspect_err(|err| {
            tracing::error!(error = %format!("{err:#}"), "Failed to prepare course list");
        })?;

        let rubric = fetch_rubric(self.api, self.settings.rubric()).await.inspect_err(|err| {
            tracing::error!(
                rubric_id = self.settings.rubric().rubric_id,
                error = %format!("{err:#}"),
                "Failed to fetch IPE rubric"
            );
        })?;

        let mut report = BatchReport::default();
        for course in &courses {
            let span =
                tracing::info_span!("course", course_id = course.course_id, row = course.row);
            self.process_course(course, rubric.id, &mut report).instrument(span).await;
        }

        tracing::info!(
            courses = courses.len(),
            provisioned = report.provisioned.len(),
            failed = report.failed.len(),
            failed_course_ids = ?failed_course_ids(&report),
            "IPE batch finished"
        );
        Ok(report)
    }

    async fn load_courses(&self) -> Result<Vec<CourseRecord>> {
        let mut table =
            self.source.fetch_table().await.context("Failed to fetch course worksheet")?;
        let column = &self.settings.sheet().course_id_column;
        let courses =
            clean_course_table(&mut table, column).context("Failed to clean course worksheet")?;

        tracing::info!(
            rows = table.rows.len(),
            courses = courses.len(),
            column = %column,
            "Cleaned course worksheet"
        );
        Ok(courses)
    }

    async fn process_course(
        &self,
        course: &CourseRecord,
        rubric_id: u64,
        report: &mut BatchReport,
    ) {
        let flow = AssignmentFlow::new(self.api, course.course_id, rubric_id);
        match flow.start_assignment_flow().await {
            Ok(assignment_id) => {
                metrics::counter!("ipe_courses_total", "status" => "provisioned").increment(1);
                report
                    .provisioned
                    .push(ProvisionedCourse { course_id: course.course_id, assignment_id });
            }
            Err(err) => {
                metrics::counter!("ipe_courses_total", "status" => "failed").increment(1);
                tracing::error!(
                    course_id = course.course_id,
                    step = %err.step(),
                    error = %err,
                    "IPE assignment flow failed"
                );
                report.failed.push(FailedCourse {
                    course_id: course.course_id,
                    step: err.step(),
                    error: err.to_string(),
                });
            }
        }
    }
}

fn failed_course_ids(report: &BatchReport) -> Vec<u64> {
    report.failed.iter().map(|item| item.course_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::course_table::CourseTable;
    use crate::test_support::{self, StaticCourseSource};
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn groups_body() -> String {
        json!([{"id": 9, "name": "IPE Competencies", "assignments": []}]).to_string()
    }

    async fn mock_rubric(server: &mut ServerGuard, status: usize, expect: usize) -> mockito::Mock {
        server
            .mock("GET", "/aa/CanvasAdmin/accounts/1/rubrics/555")
            .with_status(status)
            .with_body(json!({"id": 555, "title": "IPE Competencies"}).to_string())
            .expect(expect)
            .create_async()
            .await
    }

    async fn mock_happy_course(
        server: &mut ServerGuard,
        course_id: u64,
        assignment_id: u64,
    ) -> Vec<mockito::Mock> {
        let groups = server
            .mock("GET", format!("/aa/CanvasAdmin/courses/{course_id}/assignment_groups").as_str())
            .match_query(Matcher::Any)
            .with_body(groups_body())
            .expect(1)
            .create_async()
            .await;
        let assignment = server
            .mock("POST", format!("/aa/CanvasAdmin/courses/{course_id}/assignments").as_str())
            .with_status(201)
            .with_body(json!({"id": assignment_id}).to_string())
            .expect(1)
            .create_async()
            .await;
        let rubric = server
            .mock(
                "POST",
                format!("/aa/CanvasAdmin/courses/{course_id}/rubric_associations").as_str(),
            )
            .with_body(json!({"rubric_association": {"id": 1}}).to_string())
            .expect(1)
            .create_async()
            .await;
        vec![groups, assignment, rubric]
    }

    #[tokio::test]
    async fn failing_course_does_not_stop_the_batch() {
        let mut server = Server::new_async().await;
        let rubric = mock_rubric(&mut server, 200, 1).await;

        let _groups = server
            .mock("GET", "/aa/CanvasAdmin/courses/123/assignment_groups")
            .match_query(Matcher::Any)
            .with_body(groups_body())
            .expect(1)
            .create_async()
            .await;
        let create_assignment = server
            .mock("POST", "/aa/CanvasAdmin/courses/123/assignments")
            .with_status(201)
            .with_body(json!({"id": 700}).to_string())
            .expect(1)
            .create_async()
            .await;
        let attach = server
            .mock("POST", "/aa/CanvasAdmin/courses/123/rubric_associations")
            .with_status(502)
            .with_body("Bad Gateway")
            .expect(3)
            .create_async()
            .await;
        let happy = mock_happy_course(&mut server, 67, 701).await;

        let settings = test_support::settings(&server.url());
        let api = test_support::canvas_client(&server.url());
        let source = StaticCourseSource::new(
            &["Course ID", "Name"],
            &[&["123", "A"], &["Shell", "B"], &["", "C"], &["shell(45)", "D"], &["67", "E"]],
        );

        let report = Orchestrator::new(&settings, &api, &source)
            .start_composing_process()
            .await
            .expect("batch");

        rubric.assert_async().await;
        create_assignment.assert_async().await;
        attach.assert_async().await;
        for mock in &happy {
            mock.assert_async().await;
        }
        assert_eq!(
            report.provisioned,
            vec![ProvisionedCourse { course_id: 67, assignment_id: 701 }]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].course_id, 123);
        assert_eq!(report.failed[0].step, FlowStep::AttachRubric);
    }

    #[tokio::test]
    async fn rubric_fetch_failure_aborts_before_any_course() {
        let mut server = Server::new_async().await;
        let rubric = server
            .mock("GET", "/aa/CanvasAdmin/accounts/1/rubrics/555")
            .with_status(500)
            .with_body("oops")
            .expect(3)
            .create_async()
            .await;
        let lookup = server
            .mock("GET", "/aa/CanvasAdmin/courses/123/assignment_groups")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let settings = test_support::settings(&server.url());
        let api = test_support::canvas_client(&server.url());
        let source = StaticCourseSource::new(&["Course ID"], &[&["123"]]);

        let result = Orchestrator::new(&settings, &api, &source).start_composing_process().await;

        assert!(result.is_err());
        rubric.assert_async().await;
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn missing_course_column_aborts_before_rubric_fetch() {
        let mut server = Server::new_async().await;
        let rubric = mock_rubric(&mut server, 200, 0).await;

        let settings = test_support::settings(&server.url());
        let api = test_support::canvas_client(&server.url());
        let source = StaticCourseSource::new(&["Course", "Name"], &[&["123", "A"]]);

        let err = Orchestrator::new(&settings, &api, &source)
            .start_composing_process()
            .await
            .expect_err("should fail");

        assert!(format!("{err:#}").contains("Course ID"));
        rubric.assert_async().await;
    }

    #[tokio::test]
    async fn empty_worksheet_is_fatal() {
        let server = Server::new_async().await;
        let settings = test_support::settings(&server.url());
        let api = test_support::canvas_client(&server.url());
        let source = StaticCourseSource::from_table(CourseTable::default());

        let result = Orchestrator::new(&settings, &api, &source).start_composing_process().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn header_only_worksheet_runs_no_courses() {
        let mut server = Server::new_async().await;
        let rubric = mock_rubric(&mut server, 200, 1).await;

        let settings = test_support::settings(&server.url());
        let api = test_support::canvas_client(&server.url());
        let source = StaticCourseSource::new(&[" Course ID "], &[]);

        let report = Orchestrator::new(&settings, &api, &source)
            .start_composing_process()
            .await
            .expect("batch");

        rubric.assert_async().await;
        assert!(report.provisioned.is_empty());
        assert!(report.failed.is_empty());
    }
}
