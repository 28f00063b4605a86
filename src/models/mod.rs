pub mod activity;
pub mod event;
pub mod guest;
pub mod operator;
pub mod stats;

pub use activity::{ActivityAction, ActivityEntry, NewActivity};
pub use event::{Event, EventUpdate};
pub use guest::{Guest, GuestCategory, GuestSummary, NewGuest};
pub use operator::{NewOperator, Operator, OperatorRequest, OperatorRole, OperatorSummary};
pub use stats::{AttendanceStats, TimelineBucket};
