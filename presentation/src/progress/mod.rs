//! Progress reporting for followed missions

pub mod reporter;
