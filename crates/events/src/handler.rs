/// Execute an aggregate command deterministically (no IO).
///
/// Decides with `handle`, then applies each decided event. Useful in unit tests
/// and anywhere a command should run without persistence; the infra
/// `CommandDispatcher` is the persisted equivalent.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: quoteflow_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
