pub mod bills;
pub mod salary;

pub use bills::{
    BillDecision, NewBill, PaymentSummary, payment_summary, record_payment, refresh_overdue,
    review_bill, submit_bill,
};
pub use salary::{SalaryBreakdown, SalaryInput, compute_salary, salary_slip};
