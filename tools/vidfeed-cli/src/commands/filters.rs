//! List the filter catalog.

use vidfeed_editing_core::filters::list_filters;

pub fn run(json: bool) -> anyhow::Result<()> {
    let catalog = list_filters();
    if json {
        println!("{}", serde_json::to_string_pretty(catalog)?);
        return Ok(());
    }

    println!("Filters:");
    for spec in catalog {
        println!("  {:<10} {}", spec.name, spec.expression);
    }
    Ok(())
}
