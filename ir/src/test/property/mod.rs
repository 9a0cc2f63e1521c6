mod indexing;
