//! ERP service: gRPC endpoints over business partners, payments, document
//! workflow, issues, payroll, attachments, reports and sessions.

pub mod config;
pub mod grpc;
pub mod models;
pub mod services;
pub mod startup;
