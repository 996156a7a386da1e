//! Example: live style editing session

use weft_engine::{PipelineConfig, StyleChange, StyleOverrides, StylePipeline};

const BASELINE: &str = r#"
.card { padding: 8px; border-radius: 4px; }
.card .title { font-weight: 600; }
@media (max-width: 600px) { .card { padding: 4px; } }
"#;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("Weft Engine v{}", weft_engine::VERSION);

    smol::block_on(async {
        let mut pipeline = StylePipeline::new(PipelineConfig::default())?;
        let report = pipeline.initialize(BASELINE, StyleOverrides::new()).await?;
        println!("Baseline: {} rules", report.applied);

        // A drag gesture: many edits in flight, applied in order
        let gesture: Vec<_> = (1..=5)
            .map(|step| {
                pipeline.submit(
                    StyleChange::set_property(".card", "padding", format!("{}px", 8 + step * 2)),
                    StyleOverrides::new(),
                )
            })
            .collect();
        for step in gesture {
            let result = step.await?;
            pipeline.apply(&result);
        }

        let overrides = StyleOverrides::new().with(".card .title", "color", "rebeccapurple");
        pipeline
            .process(StyleChange::rename_selector(".card", ".panel"), overrides)
            .await?;

        println!("{}", pipeline.sheet().css_text());
        anyhow::Ok(())
    })
}
