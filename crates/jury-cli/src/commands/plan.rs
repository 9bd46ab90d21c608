use std::path::Path;

use jury_core::Problem;

pub fn plan(input: &str) -> anyhow::Result<()> {
    let problem = Problem::from_json_file(Path::new(input))?;
    let plan = jury_engine::plan(&problem)?;
    let f = &plan.fair_share;

    println!("Fair share: {:.2}  band [{}, {}]  target {}", f.mean, f.lower, f.upper, f.target);
    println!("Open slots: {}\n", plan.total());
    println!("Quotas:");
    for (resource, quota) in plan.quotas() {
        if *quota > 0 {
            println!("  {resource:<16} {quota}");
        }
    }
    Ok(())
}
