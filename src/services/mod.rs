pub(crate) mod assignment_flow;
pub(crate) mod canvas_api;
pub(crate) mod course_sheet;
pub(crate) mod course_table;
pub(crate) mod rubrics;
