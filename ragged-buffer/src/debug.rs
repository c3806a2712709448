use std::fmt::{Debug, Formatter};

/// Debug-print at most a handful of elements so long buffers stay readable in logs.
pub(crate) struct TruncatedDebug<'a, T>(pub &'a [T]);

const MAX_ELEMENTS: usize = 16;

impl<T: Debug> Debug for TruncatedDebug<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        list.entries(self.0.iter().take(MAX_ELEMENTS));
        if self.0.len() > MAX_ELEMENTS {
            list.entry(&format_args!("... {} more", self.0.len() - MAX_ELEMENTS));
        }
        list.finish()
    }
}
