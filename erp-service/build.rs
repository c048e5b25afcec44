const PROTOS: &[&str] = &[
    "../proto/erp/core/v1/core.proto",
    "../proto/erp/business_partner/v1/business_partner.proto",
    "../proto/erp/payment/v1/payment.proto",
    "../proto/erp/workflow/v1/workflow.proto",
    "../proto/erp/issue/v1/issue.proto",
    "../proto/erp/payroll/v1/payroll.proto",
    "../proto/erp/dashboard/v1/dashboard.proto",
    "../proto/erp/attachment/v1/attachment.proto",
    "../proto/erp/report/v1/report.proto",
    "../proto/erp/security/v1/security.proto",
    "../proto/erp/user_customization/v1/user_customization.proto",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("erp_descriptor.bin"))
        .compile_protos(PROTOS, &["../proto"])?;

    for proto in PROTOS {
        println!("cargo:rerun-if-changed={}", proto);
    }

    Ok(())
}
