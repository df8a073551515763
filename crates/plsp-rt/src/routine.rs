use plsp_wire::HostValue;

use crate::fault::PlResult;
use crate::sql::SqlConnection;

/// What a running routine can ask of its host.
pub trait CallContext {
    /// Engine-side connection for nested SQL. Obtaining it signals the peer,
    /// which serves the nested exchange on the same socket.
    fn connection(&mut self, autonomous: bool) -> PlResult<&mut dyn SqlConnection>;

    fn server_name(&self) -> &str;
}

/// An invokable routine. Parameters arrive already coerced to their declared
/// host representations; OUT and INOUT parameters are one-element arrays the
/// routine writes into.
pub trait Routine: Send + Sync {
    fn call(&self, ctx: &mut dyn CallContext, args: &mut [HostValue]) -> PlResult<HostValue>;
}

/// Adapts a closure into a [`Routine`].
pub struct FnRoutine<F>(pub F);

impl<F> Routine for FnRoutine<F>
where
    F: Fn(&mut dyn CallContext, &mut [HostValue]) -> PlResult<HostValue> + Send + Sync,
{
    fn call(&self, ctx: &mut dyn CallContext, args: &mut [HostValue]) -> PlResult<HostValue> {
        (self.0)(ctx, args)
    }
}
