use washline_core::Aggregate;

/// Decide and apply in one step, without persistence or publication.
///
/// Useful in tests and for replaying a command against an in-memory aggregate.
/// Production writes go through the infra `CommandDispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
