use appgen_harness::observability::init_observability;
use appgen_harness::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), HarnessError> {
    init_observability();

    let prompt = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let generator = Generator::from_env()?;
    let mut run = generator.start(GenerationRequest::new(prompt)).await?;

    while let Some(event) = run.next_event().await {
        match event {
            RunEvent::MessageCreated {
                message_id,
                data_type,
                result,
                error,
                ..
            } => {
                eprintln!("[{data_type}] {message_id}");
                eprint!("{result}");
                if !error.is_empty() {
                    eprint!("{error}");
                }
            }
            RunEvent::MessageDelta { result, error, .. } => {
                eprint!("{result}");
                if !error.is_empty() {
                    eprint!("{error}");
                }
            }
            RunEvent::MessageCompleted { .. } => eprintln!(),
            RunEvent::Completed { artifact, .. } => {
                println!("app:    {}", artifact.published_app_link);
                println!("source: {}", artifact.source_code_archive_link);
                println!("id:     {} ({})", artifact.app_id, artifact.version);
            }
            RunEvent::Error { error, .. } => eprintln!("run error: {error}"),
            RunEvent::Started { .. } => {}
        }
    }

    let _ = run.finish().await?;
    Ok(())
}
