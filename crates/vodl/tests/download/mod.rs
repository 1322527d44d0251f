mod chunked;
mod parallel;
