/// Execute an aggregate command in memory: decide, then apply what was decided.
///
/// Used by tests and by planning code that needs to know the state an aggregate
/// *would* reach without persisting anything. The persisted pipeline lives in
/// `bakeops_infra::command_dispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: bakeops_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
